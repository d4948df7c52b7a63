//! Read-only views of file records, arrays and raw records.

use super::open;
use crate::OutputFormat;
use crate::output::{hex_dump, write_field, write_header, write_json};
use anyhow::Context;
use dafkit_formats::Architecture;
use dafkit_storage::{DataKind, Handle, HandleManager, OpenMode};
use std::io::Write;
use std::path::Path;

pub fn info(
    manager: &mut HandleManager,
    path: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let (handle, architecture) = open(manager, path, false)?;
    let result = write_info(manager, handle, architecture, path, format, out);
    manager.close(handle)?;
    result
}

fn write_info(
    manager: &mut HandleManager,
    handle: Handle,
    architecture: Architecture,
    path: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let binary_format = manager.info(handle)?.format;
    let records = manager.record_count(handle)?;

    match architecture {
        Architecture::Daf => {
            let record = manager.daf().file_record(handle)?;
            let id = record.id()?;
            match format {
                OutputFormat::Json => write_json(
                    out,
                    &serde_json::json!({
                        "path": path,
                        "architecture": architecture.to_string(),
                        "id_word": id.to_string(),
                        "file_type": id.file_type(),
                        "binary_format": binary_format.to_string(),
                        "internal_name": record.internal_name(),
                        "records": records,
                        "nd": record.nd,
                        "ni": record.ni,
                        "fward": record.fward,
                        "bward": record.bward,
                        "free": record.free,
                    }),
                )?,
                OutputFormat::Text => {
                    write_header(out, &format!("DAF file {}", path.display()))?;
                    write_field(out, "ID word", &id)?;
                    write_field(out, "Binary format", binary_format)?;
                    write_field(out, "Internal name", record.internal_name())?;
                    write_field(out, "Records", records)?;
                    write_field(out, "Summary doubles (ND)", record.nd)?;
                    write_field(out, "Summary ints (NI)", record.ni)?;
                    write_field(out, "First summary record", record.fward)?;
                    write_field(out, "Last summary record", record.bward)?;
                    write_field(out, "First free address", record.free)?;
                }
            }
        }
        Architecture::Das => {
            let das = manager.das();
            let record = das.file_record(handle)?;
            let summary = das.file_summary(handle)?;
            let id = record.id()?;
            match format {
                OutputFormat::Json => write_json(
                    out,
                    &serde_json::json!({
                        "path": path,
                        "architecture": architecture.to_string(),
                        "id_word": id.to_string(),
                        "file_type": id.file_type(),
                        "binary_format": binary_format.to_string(),
                        "internal_name": record.internal_name(),
                        "records": records,
                        "reserved_records": summary.reserved_records,
                        "reserved_chars": summary.reserved_chars,
                        "comment_records": summary.comment_records,
                        "comment_chars": summary.comment_chars,
                        "first_free_record": summary.first_free_record,
                        "last_address": summary.last_address,
                        "last_record": summary.last_record,
                        "last_word": summary.last_word,
                    }),
                )?,
                OutputFormat::Text => {
                    write_header(out, &format!("DAS file {}", path.display()))?;
                    write_field(out, "ID word", &id)?;
                    write_field(out, "Binary format", binary_format)?;
                    write_field(out, "Internal name", record.internal_name())?;
                    write_field(out, "Records", records)?;
                    write_field(out, "Reserved records", summary.reserved_records)?;
                    write_field(out, "Comment records", summary.comment_records)?;
                    write_field(out, "Comment characters", summary.comment_chars)?;
                    write_field(out, "First free record", summary.first_free_record)?;
                    for kind in DataKind::ALL {
                        let i = kind.index();
                        write_field(
                            out,
                            &format!("Last {kind} address"),
                            format!(
                                "{} (record {}, word {})",
                                summary.last_address[i], summary.last_record[i], summary.last_word[i]
                            ),
                        )?;
                    }
                }
            }
        }
    }
    Ok(())
}

pub fn arrays(
    manager: &mut HandleManager,
    path: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let (handle, architecture) = open(manager, path, false)?;
    if architecture != Architecture::Daf {
        manager.close(handle)?;
        anyhow::bail!("{} is a DAS file and holds no arrays", path.display());
    }
    let arrays = manager.daf().arrays(handle);
    manager.close(handle)?;
    let arrays = arrays.with_context(|| format!("Failed to list arrays of {}", path.display()))?;

    match format {
        OutputFormat::Json => {
            let list: Vec<_> = arrays
                .iter()
                .map(|array| {
                    serde_json::json!({
                        "name": array.name,
                        "doubles": array.summary.doubles,
                        "ints": array.summary.ints,
                        "length": array.summary.len(),
                    })
                })
                .collect();
            write_json(out, &list)?;
        }
        OutputFormat::Text => {
            write_header(out, &format!("{} arrays in {}", arrays.len(), path.display()))?;
            for array in &arrays {
                let doubles: Vec<String> =
                    array.summary.doubles.iter().map(|d| format!("{d:.6e}")).collect();
                let ints: Vec<String> = array.summary.ints.iter().map(ToString::to_string).collect();
                writeln!(
                    out,
                    "{:<40} {:>10} words  [{}]  [{}]",
                    array.name,
                    array.summary.len(),
                    doubles.join(", "),
                    ints.join(", ")
                )?;
            }
        }
    }
    Ok(())
}

pub fn record(
    manager: &mut HandleManager,
    path: &Path,
    recno: u64,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let architecture = super::architecture_of(path)?;
    let handle = manager.open(path, OpenMode::Read, architecture)?;
    let record = manager.read_record(handle, recno);
    manager.close(handle)?;
    let record = record?.with_context(|| format!("Record {recno} is past the end of the file"))?;

    match format {
        OutputFormat::Json => write_json(
            out,
            &serde_json::json!({
                "record": recno,
                "hex": hex::encode(record),
            }),
        )?,
        OutputFormat::Text => {
            write_header(out, &format!("Record {recno} of {}", path.display()))?;
            for line in hex_dump(&record) {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}
