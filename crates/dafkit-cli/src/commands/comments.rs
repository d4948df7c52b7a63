//! Comment area maintenance for both architectures.

use super::open;
use crate::OutputFormat;
use crate::output::write_json;
use anyhow::Context;
use dafkit_formats::Architecture;
use dafkit_storage::{Handle, HandleManager};
use std::io::Write;
use std::path::Path;
use tracing::info;

fn read_comments(
    manager: &mut HandleManager,
    handle: Handle,
    architecture: Architecture,
) -> dafkit_storage::Result<Vec<String>> {
    match architecture {
        Architecture::Daf => manager.daf().comments(handle),
        Architecture::Das => manager.das().comments(handle),
    }
}

pub fn show(
    manager: &mut HandleManager,
    path: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let (handle, architecture) = open(manager, path, false)?;
    let lines = read_comments(manager, handle, architecture);
    manager.close(handle)?;
    let lines = lines?;

    match format {
        OutputFormat::Json => write_json(out, &serde_json::json!({ "comments": lines }))?,
        OutputFormat::Text => {
            for line in &lines {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}

pub fn add(
    manager: &mut HandleManager,
    path: &Path,
    text_file: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(text_file)
        .with_context(|| format!("Failed to read {}", text_file.display()))?;
    let lines: Vec<&str> = text.lines().collect();

    let (handle, architecture) = open(manager, path, true)?;
    let result = match architecture {
        Architecture::Daf => manager.daf().add_comments(handle, &lines),
        Architecture::Das => manager.das().add_comments(handle, &lines),
    };
    manager.close(handle)?;
    result.with_context(|| format!("Failed to add comments to {}", path.display()))?;
    info!("Added {} comment lines to {}", lines.len(), path.display());

    match format {
        OutputFormat::Json => write_json(out, &serde_json::json!({ "added": lines.len() }))?,
        OutputFormat::Text => writeln!(out, "Added {} comment lines", lines.len())?,
    }
    Ok(())
}

pub fn delete(
    manager: &mut HandleManager,
    path: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let (handle, architecture) = open(manager, path, true)?;
    let removed = read_comments(manager, handle, architecture).map(|lines| lines.len());
    let result = removed.and_then(|removed| {
        match architecture {
            Architecture::Daf => manager.daf().delete_comments(handle),
            Architecture::Das => manager.das().delete_comments(handle),
        }
        .map(|()| removed)
    });
    manager.close(handle)?;
    let removed = result.with_context(|| format!("Failed to delete comments of {}", path.display()))?;

    match format {
        OutputFormat::Json => write_json(out, &serde_json::json!({ "deleted": removed }))?,
        OutputFormat::Text => writeln!(out, "Deleted {removed} comment lines")?,
    }
    Ok(())
}
