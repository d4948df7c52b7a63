//! Close with optimization.
//!
//! Appends in mixed order scatter each kind over many clusters and
//! directories. Segregation rewrites the file so that one directory follows
//! the comment area and holds exactly one cluster per kind, in char,
//! double, int order. Unused comment records are dropped on the way.

use super::directory::DirectoryIndex;
use super::{DasFiles, DataKind};
use crate::{Handle, Result, StorageError};
use dafkit_formats::{CHARS_PER_RECORD, RECORD_BYTES};
use tracing::info;

impl DasFiles<'_> {
    /// Segregate the file, truncate it and close the handle.
    ///
    /// The handle must be writable and hold its last link; a read-only or
    /// shared handle is rejected before anything is rewritten.
    pub fn close_optimized(&mut self, handle: Handle) -> Result<()> {
        self.manager.writable_entry(handle)?;
        if self.manager.is_locked(handle)? {
            return Err(StorageError::HandleLocked(handle));
        }

        let last = self.state(handle)?.index.last_addresses();
        let mut data = Vec::with_capacity(3);
        for kind in DataKind::ALL {
            let words = last[kind.index()];
            data.push(if words == 0 {
                Vec::new()
            } else {
                self.read_raw(handle, kind, 1, words)?
            });
        }
        let comments = self.comment_text(handle)?;

        let state = self.state(handle)?;
        let first_comment = 2 + state.file_record.nresvr as u64;
        let comment_records = comments.len().div_ceil(CHARS_PER_RECORD) as u64;
        let first_directory = first_comment + comment_records;

        for (i, chunk) in comments.chunks(CHARS_PER_RECORD).enumerate() {
            let mut record = [0; RECORD_BYTES];
            record[..chunk.len()].copy_from_slice(chunk);
            self.manager.write_record(handle, first_comment + i as u64, &record)?;
        }

        let mut recno = first_directory + 1;
        for bytes in &data {
            for chunk in bytes.chunks(RECORD_BYTES) {
                let mut record = [0; RECORD_BYTES];
                record[..chunk.len()].copy_from_slice(chunk);
                self.manager.write_record(handle, recno, &record)?;
                recno += 1;
            }
        }

        let state = self.state_mut(handle)?;
        state.index = DirectoryIndex::segregated(first_directory, last);
        state.file_record.ncomr = comment_records as i32;
        let end = state.index.end_record();
        self.write_directories(handle, &[0])?;
        self.manager.set_record_count(handle, end)?;
        self.write_file_record(handle)?;

        info!(
            "Segregated handle {handle}: {} records, addresses {last:?}",
            end
        );
        self.manager.close(handle)
    }
}
