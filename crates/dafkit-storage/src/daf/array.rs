//! Writing new arrays.
//!
//! An array is written in three steps: `begin_new_array` records the
//! summary and name and locks the handle, `add_data` appends doubles
//! starting at the file's free address, and `end_array` stores the summary
//! with the final addresses, advances FREE and unlocks. Until then the
//! array is invisible to searches. `abandon_array` discards it; since FREE
//! never moved, the space is reused by the next array.

use super::{ArraySummary, DafFiles, word_offset, word_record};
use crate::handle::HandleManager;
use crate::{Handle, Result, StorageError};
use dafkit_formats::{DOUBLES_PER_RECORD, SummaryRecord};
use tracing::debug;

/// Array being written on a handle.
#[derive(Debug, Clone)]
pub(crate) struct PendingArray {
    summary: ArraySummary,
    name: String,
    /// Address of the first word.
    begin: usize,
    /// Address the next word goes to.
    next: usize,
}

impl<'m> DafFiles<'m> {
    /// Start a new array.
    ///
    /// `summary` must match the file's ND/NI; its address integers are
    /// filled in when the array ends.
    pub fn begin_new_array(
        self,
        handle: Handle,
        summary: &ArraySummary,
        name: &str,
    ) -> Result<ArrayBuilder<'m>> {
        let mut daf = self;
        daf.manager.writable_entry(handle)?;
        let state = daf.state(handle)?;
        if state.array.is_some() {
            return Err(StorageError::ArrayInProgress(handle));
        }
        if state.search.is_active() {
            return Err(StorageError::SearchInProgress(handle));
        }
        summary.pack(state.layout)?;

        let free = state.file_record.free as usize;
        daf.state_mut(handle)?.array = Some(PendingArray {
            summary: summary.clone(),
            name: name.to_string(),
            begin: free,
            next: free,
        });
        daf.manager.lock(handle)?;
        debug!("Began array {name:?} on handle {handle} at word {free}");

        Ok(ArrayBuilder {
            manager: daf.manager,
            handle,
        })
    }

    /// Append doubles to the array in progress.
    pub fn add_data(&mut self, handle: Handle, data: &[f64]) -> Result<()> {
        let pending = self
            .state(handle)?
            .array
            .as_ref()
            .ok_or(StorageError::NoArrayInProgress(handle))?;
        let mut address = pending.next;

        let mut written = 0;
        while written < data.len() {
            let offset = word_offset(address);
            let count = (DOUBLES_PER_RECORD - offset).min(data.len() - written);
            self.manager.write_doubles(
                handle,
                word_record(address),
                offset,
                &data[written..written + count],
            )?;
            written += count;
            address += count;
        }

        if let Some(pending) = self.state_mut(handle)?.array.as_mut() {
            pending.next = address;
        }
        Ok(())
    }

    /// Finish the array in progress and make it visible.
    ///
    /// Returns the stored summary with its final addresses.
    pub fn end_array(&mut self, handle: Handle) -> Result<ArraySummary> {
        let state = self.state(handle)?;
        let layout = state.layout;
        let pending = state
            .array
            .clone()
            .ok_or(StorageError::NoArrayInProgress(handle))?;
        if pending.next == pending.begin {
            return Err(StorageError::EmptyArray(handle));
        }

        let end = pending.next - 1;
        let mut summary = pending.summary;
        let ni = summary.ints.len();
        summary.ints[ni - 2] = pending.begin as i32;
        summary.ints[ni - 1] = end as i32;
        let packed = summary.pack(layout)?;

        let format = self.format(handle)?;
        let bward = state.file_record.bward as u64;
        let mut last = self.fetch_summary_record(handle, bward)?;

        let mut free = pending.next;
        if last.nsum() < layout.per_record() {
            let slot = last.nsum();
            last.summaries.push(packed);
            let bytes = layout.encode_record(format, &last)?;
            self.manager.write_record(handle, bward, &bytes)?;
            self.manager.write_bytes(
                handle,
                bward + 1,
                slot * layout.name_len(),
                &layout.name_field(&pending.name),
            )?;
        } else {
            // New summary/name pair after the data just written.
            let recno = word_record(free - 1) + 1;
            last.next = recno as usize;
            let bytes = layout.encode_record(format, &last)?;
            self.manager.write_record(handle, bward, &bytes)?;

            let mut record = SummaryRecord::new(0, bward as usize);
            record.summaries.push(packed);
            let bytes = layout.encode_record(format, &record)?;
            self.manager.write_record(handle, recno, &bytes)?;
            self.manager
                .write_record(handle, recno + 1, &layout.encode_names(&[pending.name.as_str()]))?;

            self.state_mut(handle)?.file_record.bward = recno as i32;
            free = (recno as usize + 1) * DOUBLES_PER_RECORD + 1;
            debug!("Linked summary record {recno} after {bward} on handle {handle}");
        }

        let state = self.state_mut(handle)?;
        state.file_record.free = free as i32;
        state.array = None;
        self.write_file_record(handle)?;
        self.manager.unlock(handle)?;

        debug!(
            "Ended array {:?} on handle {handle}: words {}..={end}",
            pending.name, pending.begin
        );
        Ok(summary)
    }

    /// Drop the array in progress without storing it.
    pub fn abandon_array(&mut self, handle: Handle) -> Result<()> {
        let state = self.state_mut(handle)?;
        let pending = state
            .array
            .take()
            .ok_or(StorageError::NoArrayInProgress(handle))?;
        self.manager.unlock(handle)?;
        debug!("Abandoned array {:?} on handle {handle}", pending.name);
        Ok(())
    }
}

/// Array in progress on a handle.
///
/// Obtained from [`DafFiles::begin_new_array`]. Dropping the builder without
/// calling [`finish`](Self::finish) or [`abandon`](Self::abandon) leaves the
/// array in progress; it can still be completed through [`DafFiles`].
pub struct ArrayBuilder<'m> {
    manager: &'m mut HandleManager,
    handle: Handle,
}

impl ArrayBuilder<'_> {
    /// Handle the array is written to.
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Append doubles to the array.
    pub fn append(&mut self, data: &[f64]) -> Result<()> {
        self.manager.daf().add_data(self.handle, data)
    }

    /// Number of doubles appended so far.
    pub fn appended(&mut self) -> Result<usize> {
        let pending = self
            .manager
            .daf()
            .state(self.handle)?
            .array
            .as_ref()
            .map_or(0, |pending| pending.next - pending.begin);
        Ok(pending)
    }

    /// End the array and return its final summary.
    pub fn finish(self) -> Result<ArraySummary> {
        self.manager.daf().end_array(self.handle)
    }

    /// Discard the array.
    pub fn abandon(self) -> Result<()> {
        self.manager.daf().abandon_array(self.handle)
    }
}
