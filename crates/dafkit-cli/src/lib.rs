//! Library side of the `dafkit` command-line tool.
//!
//! The binary only parses arguments and installs logging; every subcommand
//! is a function here so it can be driven from tests with an in-memory
//! writer.

use clap::Subcommand;
use dafkit_storage::{HandleManager, ManagerConfig};
use std::io::Write;
use std::path::{Path, PathBuf};

pub mod commands;
pub mod output;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human readable text
    #[default]
    Text,
    /// Pretty printed JSON
    Json,
}

/// Subcommands of `dafkit`.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the file record of a DAF or DAS file
    Info {
        /// Kernel file
        file: PathBuf,
    },

    /// List the arrays of a DAF in forward order
    Arrays {
        /// DAF file
        file: PathBuf,
    },

    /// Print the comment area
    Comments {
        /// Kernel file
        file: PathBuf,
    },

    /// Append the lines of a text file to the comment area
    AddComments {
        /// Kernel file, opened for writing
        file: PathBuf,

        /// Text file with one comment line per line
        text_file: PathBuf,
    },

    /// Remove all comments
    DeleteComments {
        /// Kernel file, opened for writing
        file: PathBuf,
    },

    /// Hex dump of one physical record
    Record {
        /// Kernel file
        file: PathBuf,

        /// Record number, starting at 1
        recno: u64,
    },

    /// Segregate a DAS file and truncate unused records
    Optimize {
        /// DAS file, opened for writing
        file: PathBuf,
    },
}

/// Build the manager configuration from an optional JSON file and flag overrides.
pub fn manager_config(
    config: Option<&Path>,
    max_units: Option<usize>,
) -> anyhow::Result<ManagerConfig> {
    let mut config = match config {
        Some(path) => ManagerConfig::from_json_file(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(units) = max_units {
        config = config.with_max_units(units);
        config.validate()?;
    }
    Ok(config)
}

/// Run one subcommand against `manager`, writing results to `out`.
pub fn run(
    command: Commands,
    manager: &mut HandleManager,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        Commands::Info { file } => commands::inspect::info(manager, &file, format, out),
        Commands::Arrays { file } => commands::inspect::arrays(manager, &file, format, out),
        Commands::Record { file, recno } => {
            commands::inspect::record(manager, &file, recno, format, out)
        }
        Commands::Comments { file } => commands::comments::show(manager, &file, format, out),
        Commands::AddComments { file, text_file } => {
            commands::comments::add(manager, &file, &text_file, format, out)
        }
        Commands::DeleteComments { file } => {
            commands::comments::delete(manager, &file, format, out)
        }
        Commands::Optimize { file } => commands::optimize::handle(manager, &file, format, out),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_max_units_override_is_validated() {
        let config = manager_config(None, Some(4)).expect("config");
        assert_eq!(config.max_units, 4);
        assert!(manager_config(None, Some(0)).is_err());
    }

    #[test]
    fn test_config_file_then_override() {
        let dir = tempfile::TempDir::new().expect("dir");
        let path = dir.path().join("dafkit.json");
        std::fs::write(&path, r#"{ "max_files": 10, "max_units": 2 }"#).expect("write");

        let config = manager_config(Some(&path), None).expect("config");
        assert_eq!((config.max_files, config.max_units), (10, 2));
        assert!(manager_config(Some(&path), Some(11)).is_err());
    }
}
