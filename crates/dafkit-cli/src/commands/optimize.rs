//! DAS segregation.

use super::open;
use crate::OutputFormat;
use crate::output::{write_field, write_json};
use dafkit_formats::Architecture;
use dafkit_storage::HandleManager;
use std::io::Write;
use std::path::Path;

pub fn handle(
    manager: &mut HandleManager,
    path: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let (handle, architecture) = open(manager, path, true)?;
    if architecture != Architecture::Das {
        manager.close(handle)?;
        anyhow::bail!("{} is not a DAS file", path.display());
    }

    let before = manager.record_count(handle)?;
    if let Err(e) = manager.das().close_optimized(handle) {
        // Only a rejected optimization leaves the handle open.
        if manager.handles().contains(&handle) {
            manager.close(handle)?;
        }
        return Err(e.into());
    }

    let handle = manager.das().open_read(path)?;
    let after = manager.record_count(handle)?;
    let summary = manager.das().file_summary(handle)?;
    manager.close(handle)?;

    match format {
        OutputFormat::Json => write_json(
            out,
            &serde_json::json!({
                "records_before": before,
                "records_after": after,
                "last_address": summary.last_address,
            }),
        )?,
        OutputFormat::Text => {
            write_field(out, "Records before", before)?;
            write_field(out, "Records after", after)?;
            write_field(
                out,
                "Last addresses",
                format!(
                    "{} chars, {} doubles, {} ints",
                    summary.last_address[0], summary.last_address[1], summary.last_address[2]
                ),
            )?;
        }
    }
    Ok(())
}
