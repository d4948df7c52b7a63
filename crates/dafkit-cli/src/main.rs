use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dafkit_cli::{Commands, OutputFormat};
use dafkit_storage::HandleManager;

#[derive(Parser)]
#[command(
    name = "dafkit",
    about = "Inspect and maintain DAF and DAS kernel files",
    version,
    long_about = "A command-line tool for reading file records, array summaries and comment areas of direct-access kernel files, and for compacting DAS files."
)]
struct Cli {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a JSON handle manager configuration
    #[arg(short, long, global = true, env = "DAFKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of simultaneously connected OS files
    #[arg(long, global = true, env = "DAFKIT_MAX_UNITS")]
    max_units: Option<usize>,

    /// Output format
    #[arg(short = 'o', long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = dafkit_cli::manager_config(cli.config.as_deref(), cli.max_units)?;
    let mut manager = HandleManager::new(config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    dafkit_cli::run(cli.command, &mut manager, cli.format, &mut out)
}
