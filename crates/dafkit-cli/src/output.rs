//! Output formatting helpers shared by the subcommands.

use serde::Serialize;
use std::io::{self, Write};

/// Width of the label column in key/value listings.
const LABEL_WIDTH: usize = 22;

/// Bytes shown per hex dump line.
const DUMP_WIDTH: usize = 16;

/// Write `label: value` with the label padded to a fixed column.
pub fn write_field(out: &mut dyn Write, label: &str, value: impl std::fmt::Display) -> io::Result<()> {
    writeln!(out, "{:<LABEL_WIDTH$} {value}", format!("{label}:"))
}

/// Write a section header followed by an underline.
pub fn write_header(out: &mut dyn Write, text: &str) -> io::Result<()> {
    writeln!(out, "{text}")?;
    writeln!(out, "{}", "=".repeat(text.len()))
}

/// Write `value` as pretty JSON followed by a newline.
pub fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Offset, hex and printable-ASCII columns, one line per 16 bytes.
pub fn hex_dump(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(DUMP_WIDTH)
        .enumerate()
        .map(|(line, chunk)| {
            let hex = chunk
                .chunks(4)
                .map(hex::encode)
                .collect::<Vec<_>>()
                .join(" ");
            let ascii: String = chunk
                .iter()
                .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                .collect();
            format!("{:04x}  {hex:<35}  {ascii}", line * DUMP_WIDTH)
        })
        .collect()
}
