//! Comment area of a DAF.
//!
//! Comments live in the reserved records between the file record and the
//! first summary record. Each reserved record carries up to 1000
//! characters; a NUL ends a line and EOT ends the area. Growing or dropping
//! the area moves every record after it, so the directory pointers and all
//! array addresses are rewritten to match.

use super::DafFiles;
use crate::{Handle, Result, StorageError};
use dafkit_formats::{DOUBLES_PER_RECORD, RECORD_BYTES};
use tracing::{debug, info};

/// Characters stored in one reserved record.
const DAF_COMMENT_CHARS: usize = 1000;

const END_OF_LINE: u8 = 0x00;
const END_OF_TEXT: u8 = 0x04;

/// Check that a line only holds printable ASCII.
pub(crate) fn validate_line(line: &str) -> Result<()> {
    if line.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        Ok(())
    } else {
        Err(StorageError::InvalidComment(line.to_string()))
    }
}

/// Split comment text into lines at `terminator`.
///
/// A trailing fragment without a terminator still counts as a line.
pub(crate) fn split_lines(text: &[u8], terminator: u8) -> Vec<String> {
    let mut lines: Vec<String> = text
        .split(|b| *b == terminator)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect();
    if text.last().is_none_or(|b| *b == terminator) {
        lines.pop();
    }
    lines
}

impl DafFiles<'_> {
    fn reserved_records(&self, handle: Handle) -> Result<u64> {
        Ok(self.state(handle)?.file_record.fward as u64 - 2)
    }

    /// Raw comment text up to, not including, the EOT marker.
    ///
    /// `None` when the area holds no EOT, which means it is empty.
    fn comment_text(&mut self, handle: Handle) -> Result<Option<Vec<u8>>> {
        let reserved = self.reserved_records(handle)?;
        let mut text = Vec::new();
        for recno in 2..reserved + 2 {
            let record = self
                .manager
                .read_record(handle, recno)?
                .unwrap_or([0; RECORD_BYTES]);
            let chunk = &record[..DAF_COMMENT_CHARS];
            if let Some(end) = chunk.iter().position(|b| *b == END_OF_TEXT) {
                text.extend_from_slice(&chunk[..end]);
                return Ok(Some(text));
            }
            text.extend_from_slice(chunk);
        }
        Ok(None)
    }

    /// Lines of the comment area.
    pub fn comments(&mut self, handle: Handle) -> Result<Vec<String>> {
        Ok(self
            .comment_text(handle)?
            .map(|text| split_lines(&text, END_OF_LINE))
            .unwrap_or_default())
    }

    /// Append lines to the comment area, adding reserved records as needed.
    pub fn add_comments<S: AsRef<str>>(&mut self, handle: Handle, lines: &[S]) -> Result<()> {
        self.ensure_quiet(handle)?;
        for line in lines {
            validate_line(line.as_ref())?;
        }
        if lines.is_empty() {
            return Ok(());
        }

        let mut text = self.comment_text(handle)?.unwrap_or_default();
        for line in lines {
            text.extend_from_slice(line.as_ref().as_bytes());
            text.push(END_OF_LINE);
        }
        text.push(END_OF_TEXT);

        let needed = text.len().div_ceil(DAF_COMMENT_CHARS) as u64;
        let reserved = self.reserved_records(handle)?;
        if needed > reserved {
            self.shift_records(handle, (needed - reserved) as i64)?;
        }

        for (i, chunk) in text.chunks(DAF_COMMENT_CHARS).enumerate() {
            let mut record = [0; RECORD_BYTES];
            record[..chunk.len()].copy_from_slice(chunk);
            self.manager.write_record(handle, i as u64 + 2, &record)?;
        }
        debug!("Added {} comment lines on handle {handle}", lines.len());
        Ok(())
    }

    /// Remove the comment area and every reserved record.
    pub fn delete_comments(&mut self, handle: Handle) -> Result<()> {
        self.ensure_quiet(handle)?;
        let reserved = self.reserved_records(handle)?;
        if reserved > 0 {
            self.shift_records(handle, -(reserved as i64))?;
        }
        Ok(())
    }

    /// Reject changes to the layout while the handle is busy.
    fn ensure_quiet(&mut self, handle: Handle) -> Result<()> {
        self.manager.writable_entry(handle)?;
        let state = self.state(handle)?;
        if state.array.is_some() {
            return Err(StorageError::ArrayInProgress(handle));
        }
        if state.search.is_active() {
            return Err(StorageError::SearchInProgress(handle));
        }
        Ok(())
    }

    /// Move every record from FWARD onward by `delta` records and patch
    /// the pointers and array addresses that refer to them.
    fn shift_records(&mut self, handle: Handle, delta: i64) -> Result<()> {
        let fward = self.state(handle)?.file_record.fward as u64;
        let count = self.manager.record_count(handle)?;
        let moved = |recno: u64| recno.wrapping_add_signed(delta);

        if delta > 0 {
            for recno in (fward..=count).rev() {
                self.move_record(handle, recno, moved(recno))?;
            }
        } else {
            for recno in fward..=count {
                self.move_record(handle, recno, moved(recno))?;
            }
            self.manager.set_record_count(handle, moved(count))?;
        }

        let words = delta * DOUBLES_PER_RECORD as i64;
        let shift_word = |word: i32| (i64::from(word) + words) as i32;
        let shift_link = |link: usize| {
            if link == 0 { 0 } else { moved(link as u64) as usize }
        };

        let state = self.state_mut(handle)?;
        let record = &mut state.file_record;
        record.fward = moved(record.fward as u64) as i32;
        record.bward = moved(record.bward as u64) as i32;
        record.free = shift_word(record.free);
        let layout = state.layout;
        let format = self.format(handle)?;
        self.write_file_record(handle)?;

        let limit = self.manager.record_count(handle)?;
        let mut recno = moved(fward);
        let mut hops = 0;
        while recno != 0 {
            hops += 1;
            if hops > limit {
                return Err(self.corrupt(handle, format!("summary list cycle at record {recno}")));
            }

            let mut summary_record = self.fetch_summary_record(handle, recno)?;
            summary_record.next = shift_link(summary_record.next);
            summary_record.prev = shift_link(summary_record.prev);
            for summary in &mut summary_record.summaries {
                let (begin, end) = layout.addresses(summary)?;
                *summary = layout.with_addresses(summary, shift_word(begin), shift_word(end))?;
            }
            let bytes = layout.encode_record(format, &summary_record)?;
            self.manager.write_record(handle, recno, &bytes)?;
            recno = summary_record.next as u64;
        }

        info!("Shifted records of handle {handle} by {delta}");
        Ok(())
    }

    fn move_record(&mut self, handle: Handle, from: u64, to: u64) -> Result<()> {
        if let Some(record) = self.manager.read_record(handle, from)? {
            self.manager.write_record(handle, to, &record)?;
        }
        Ok(())
    }
}
