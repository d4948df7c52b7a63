//! Comment area of a DAS.
//!
//! Comment records follow the reserved records. Every byte of a comment
//! record is text; NCOMC counts the characters in use and a line feed ends
//! each line. Growing the area pushes the directories and their clusters
//! further into the file.

use super::DasFiles;
use crate::daf::comments::{split_lines, validate_line};
use crate::{Handle, Result};
use dafkit_formats::{CHARS_PER_RECORD, RECORD_BYTES};
use tracing::{debug, info};

const END_OF_LINE: u8 = b'\n';

impl DasFiles<'_> {
    fn comment_area(&self, handle: Handle) -> Result<(u64, u64, usize)> {
        let record = &self.state(handle)?.file_record;
        Ok((
            2 + record.nresvr as u64,
            record.ncomr as u64,
            record.ncomc as usize,
        ))
    }

    pub(super) fn comment_text(&mut self, handle: Handle) -> Result<Vec<u8>> {
        let (first, records, chars) = self.comment_area(handle)?;
        let mut text = Vec::with_capacity(chars);
        for recno in first..first + records {
            if text.len() >= chars {
                break;
            }
            let record = self
                .manager
                .read_record(handle, recno)?
                .unwrap_or([0; RECORD_BYTES]);
            let take = (chars - text.len()).min(CHARS_PER_RECORD);
            text.extend_from_slice(&record[..take]);
        }
        Ok(text)
    }

    /// Lines of the comment area.
    pub fn comments(&mut self, handle: Handle) -> Result<Vec<String>> {
        let text = self.comment_text(handle)?;
        Ok(split_lines(&text, END_OF_LINE))
    }

    /// Append lines to the comment area, adding comment records as needed.
    pub fn add_comments<S: AsRef<str>>(&mut self, handle: Handle, lines: &[S]) -> Result<()> {
        self.manager.writable_entry(handle)?;
        for line in lines {
            validate_line(line.as_ref())?;
        }
        if lines.is_empty() {
            return Ok(());
        }

        let mut text = self.comment_text(handle)?;
        for line in lines {
            text.extend_from_slice(line.as_ref().as_bytes());
            text.push(END_OF_LINE);
        }

        let (first, records, _) = self.comment_area(handle)?;
        let needed = text.len().div_ceil(CHARS_PER_RECORD) as u64;
        if needed > records {
            self.shift_directories(handle, needed - records)?;
        }

        for (i, chunk) in text.chunks(CHARS_PER_RECORD).enumerate() {
            let mut record = [0; RECORD_BYTES];
            record[..chunk.len()].copy_from_slice(chunk);
            self.manager.write_record(handle, first + i as u64, &record)?;
        }

        self.state_mut(handle)?.file_record.ncomc = text.len() as i32;
        self.write_file_record(handle)?;
        debug!("Added {} comment lines on handle {handle}", lines.len());
        Ok(())
    }

    /// Clear the comment text. The comment records stay allocated.
    pub fn delete_comments(&mut self, handle: Handle) -> Result<()> {
        self.manager.writable_entry(handle)?;
        let (first, records, _) = self.comment_area(handle)?;
        for recno in first..first + records {
            self.manager.write_record(handle, recno, &[0; RECORD_BYTES])?;
        }
        self.state_mut(handle)?.file_record.ncomc = 0;
        self.write_file_record(handle)
    }

    /// Add `delta` comment records by moving every directory and cluster
    /// further into the file.
    fn shift_directories(&mut self, handle: Handle, delta: u64) -> Result<()> {
        let start = self.state(handle)?.first_directory();
        let count = self.manager.record_count(handle)?;
        for recno in (start..=count).rev() {
            if let Some(record) = self.manager.read_record(handle, recno)? {
                self.manager.write_record(handle, recno + delta, &record)?;
            }
        }

        let state = self.state_mut(handle)?;
        state.index.shift(delta);
        state.file_record.ncomr += delta as i32;
        let positions: Vec<usize> = (0..state.index.directories().len()).collect();
        self.write_directories(handle, &positions)?;
        self.write_file_record(handle)?;

        info!("Grew comment area of handle {handle} by {delta} records");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{HandleManager, StorageError};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_comments_grow_area_and_keep_data() {
        let dir = TempDir::new().expect("dir");
        let path = dir.path().join("c.das");
        let mut manager = HandleManager::default();
        let handle = manager.das().open_new(&path, "EK", "COMMENTS", 1).expect("create");

        let ints: Vec<i32> = (0..1000).collect();
        manager.das().add_ints(handle, &ints).expect("ints");
        manager.das().add_chars(handle, b"payload").expect("chars");

        let lines: Vec<String> = (0..30).map(|i| format!("line {i:02} {}", "=".repeat(80))).collect();
        manager.das().add_comments(handle, &lines).expect("add");

        let summary = manager.das().file_summary(handle).expect("summary");
        assert_eq!(summary.comment_records, 3);
        assert_eq!(summary.comment_chars, 30 * 89);
        manager.close(handle).expect("close");

        let handle = manager.das().open_write(&path).expect("reopen");
        let mut das = manager.das();
        assert_eq!(das.comments(handle).expect("comments"), lines);
        assert_eq!(das.read_ints(handle, 1, 1000).expect("ints"), ints);
        assert_eq!(das.read_chars(handle, 1, 7).expect("chars"), b"payload".to_vec());

        das.delete_comments(handle).expect("delete");
        assert!(das.comments(handle).expect("comments").is_empty());
        let summary = das.file_summary(handle).expect("summary");
        assert_eq!(summary.comment_records, 3);
        assert_eq!(summary.comment_chars, 0);

        das.add_comments(handle, &["again"]).expect("add");
        assert_eq!(das.comments(handle).expect("comments"), vec!["again"]);
        assert_eq!(das.read_ints(handle, 999, 1000).expect("ints"), vec![998, 999]);
    }

    #[test]
    fn test_invalid_comment_rejected() {
        let dir = TempDir::new().expect("dir");
        let mut manager = HandleManager::default();
        let handle = manager
            .das()
            .open_new(dir.path().join("c.das"), "EK", "C", 0)
            .expect("create");
        assert!(matches!(
            manager.das().add_comments(handle, &["bell\u{7}"]),
            Err(StorageError::InvalidComment(_))
        ));
        assert!(manager.das().comments(handle).expect("comments").is_empty());
    }
}
