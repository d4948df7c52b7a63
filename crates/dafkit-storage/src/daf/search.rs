//! Array search over the summary record list.
//!
//! A search walks the summaries of a DAF in file order or in reverse. It is
//! started with `begin_forward_search` or `begin_backward_search`, stepped
//! with `find_next` / `find_prev` (the two may be mixed), and ends when a
//! step runs off either end of the list or `end_search` is called. The
//! handle is locked for as long as a search is active.
//!
//! Every record entered is checked: its number must lie inside the file,
//! its NSUM must fit the record and its back link must point at the record
//! just left. A failed check resets the search, unlocks the handle and
//! reports a corrupt directory.

use super::{ArrayInfo, ArraySummary, DafFiles};
use crate::{Handle, Result, StorageError};
use dafkit_formats::{FormatError, SummaryRecord};

/// Externally visible search state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchStatus {
    /// No search started.
    Idle,
    /// Last step moved forward.
    Forward,
    /// Last step moved backward.
    Backward,
    /// The search ran off one end of the list.
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub(crate) enum SearchState {
    #[default]
    Idle,
    Forward(SearchCursor),
    Backward(SearchCursor),
    Exhausted,
}

impl SearchState {
    pub(crate) const fn is_active(&self) -> bool {
        matches!(self, Self::Forward(_) | Self::Backward(_))
    }

    fn cursor(&self) -> Option<&SearchCursor> {
        match self {
            Self::Forward(cursor) | Self::Backward(cursor) => Some(cursor),
            Self::Idle | Self::Exhausted => None,
        }
    }

    fn cursor_mut(&mut self) -> Option<&mut SearchCursor> {
        match self {
            Self::Forward(cursor) | Self::Backward(cursor) => Some(cursor),
            Self::Idle | Self::Exhausted => None,
        }
    }
}

/// Position of a search.
#[derive(Debug, Clone)]
pub(crate) struct SearchCursor {
    /// Current summary record.
    recno: u64,
    record: SummaryRecord,
    /// Index of the current summary; -1 is before the first, NSUM after the last.
    slot: isize,
    /// Records entered so far, bounded by the file size.
    hops: u64,
}

impl SearchCursor {
    fn current(&self) -> Option<usize> {
        usize::try_from(self.slot)
            .ok()
            .filter(|slot| *slot < self.record.nsum())
    }
}

enum Direction {
    Forward,
    Backward,
}

impl DafFiles<'_> {
    /// Start a search before the first array.
    pub fn begin_forward_search(&mut self, handle: Handle) -> Result<()> {
        self.begin_search(handle, Direction::Forward)
    }

    /// Start a search after the last array.
    pub fn begin_backward_search(&mut self, handle: Handle) -> Result<()> {
        self.begin_search(handle, Direction::Backward)
    }

    fn begin_search(&mut self, handle: Handle, direction: Direction) -> Result<()> {
        let state = self.state(handle)?;
        if state.array.is_some() {
            return Err(StorageError::ArrayInProgress(handle));
        }
        let was_active = state.search.is_active();
        let recno = match direction {
            Direction::Forward => state.file_record.fward,
            Direction::Backward => state.file_record.bward,
        } as u64;

        if was_active {
            self.state_mut(handle)?.search = SearchState::Idle;
            self.manager.unlock(handle)?;
        }

        let record = self.fetch_summary_record(handle, recno)?;
        let adjacent_zero = match direction {
            Direction::Forward => record.prev == 0,
            Direction::Backward => record.next == 0,
        };
        if !adjacent_zero {
            return Err(self.corrupt(handle, format!("summary record {recno} is not a list end")));
        }

        let cursor = SearchCursor {
            slot: match direction {
                Direction::Forward => -1,
                Direction::Backward => record.nsum() as isize,
            },
            recno,
            record,
            hops: 1,
        };
        self.state_mut(handle)?.search = match direction {
            Direction::Forward => SearchState::Forward(cursor),
            Direction::Backward => SearchState::Backward(cursor),
        };
        self.manager.lock(handle)
    }

    /// Advance to the next array.
    ///
    /// Returns `false` once the search passes the last array; the search is
    /// then over and the handle unlocked.
    pub fn find_next(&mut self, handle: Handle) -> Result<bool> {
        self.step(handle, Direction::Forward)
    }

    /// Move back to the previous array.
    pub fn find_prev(&mut self, handle: Handle) -> Result<bool> {
        self.step(handle, Direction::Backward)
    }

    fn step(&mut self, handle: Handle, direction: Direction) -> Result<bool> {
        let mut cursor = match std::mem::take(&mut self.state_mut(handle)?.search) {
            SearchState::Forward(cursor) | SearchState::Backward(cursor) => cursor,
            SearchState::Exhausted => {
                self.state_mut(handle)?.search = SearchState::Exhausted;
                return Ok(false);
            }
            SearchState::Idle => return Err(StorageError::NoSearch(handle)),
        };

        match self.advance(handle, &mut cursor, &direction) {
            Ok(true) => {
                self.state_mut(handle)?.search = match direction {
                    Direction::Forward => SearchState::Forward(cursor),
                    Direction::Backward => SearchState::Backward(cursor),
                };
                Ok(true)
            }
            Ok(false) => {
                self.state_mut(handle)?.search = SearchState::Exhausted;
                self.manager.unlock(handle)?;
                Ok(false)
            }
            Err(e) => {
                self.manager.unlock(handle)?;
                Err(e)
            }
        }
    }

    fn advance(&mut self, handle: Handle, cursor: &mut SearchCursor, direction: &Direction) -> Result<bool> {
        let limit = self.manager.record_count(handle)?;
        loop {
            let nsum = cursor.record.nsum() as isize;
            let (target, link) = match direction {
                Direction::Forward => (cursor.slot + 1, cursor.record.next),
                Direction::Backward => (cursor.slot - 1, cursor.record.prev),
            };
            if (0..nsum).contains(&target) {
                cursor.slot = target;
                return Ok(true);
            }
            if link == 0 {
                return Ok(false);
            }

            cursor.hops += 1;
            if cursor.hops > limit {
                return Err(self.corrupt(handle, "summary record list contains a cycle".to_string()));
            }

            let link = link as u64;
            let record = self.fetch_summary_record(handle, link)?;
            let back = match direction {
                Direction::Forward => record.prev,
                Direction::Backward => record.next,
            } as u64;
            if back != cursor.recno {
                return Err(self.corrupt(
                    handle,
                    format!(
                        "summary record {link} links back to {back}, expected {}",
                        cursor.recno
                    ),
                ));
            }

            cursor.slot = match direction {
                Direction::Forward => -1,
                Direction::Backward => record.nsum() as isize,
            };
            cursor.recno = link;
            cursor.record = record;
        }
    }

    /// Read and decode a summary record, reporting damage as corruption.
    pub(crate) fn fetch_summary_record(&mut self, handle: Handle, recno: u64) -> Result<SummaryRecord> {
        let count = self.manager.record_count(handle)?;
        if recno < 2 || recno > count {
            return Err(self.corrupt(
                handle,
                format!("summary record {recno} outside file of {count} records"),
            ));
        }

        let layout = self.state(handle)?.layout;
        let format = self.format(handle)?;
        let Some(record) = self.manager.read_record(handle, recno)? else {
            return Err(self.corrupt(handle, format!("summary record {recno} missing")));
        };

        match layout.decode_record(format, &record) {
            Ok(decoded) => Ok(decoded),
            Err(e @ FormatError::InvalidControlWord { .. }) => {
                Err(self.corrupt(handle, format!("summary record {recno}: {e}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// End an active search and unlock the handle.
    ///
    /// Does nothing when no search is active.
    pub fn end_search(&mut self, handle: Handle) -> Result<()> {
        let state = self.state_mut(handle)?;
        if state.search.is_active() {
            state.search = SearchState::Idle;
            self.manager.unlock(handle)?;
        }
        Ok(())
    }

    /// Current search state.
    pub fn search_status(&self, handle: Handle) -> Result<SearchStatus> {
        Ok(match self.state(handle)?.search {
            SearchState::Idle => SearchStatus::Idle,
            SearchState::Forward(_) => SearchStatus::Forward,
            SearchState::Backward(_) => SearchStatus::Backward,
            SearchState::Exhausted => SearchStatus::Exhausted,
        })
    }

    fn current_position(&self, handle: Handle) -> Result<(u64, usize, Vec<f64>)> {
        let cursor = self
            .state(handle)?
            .search
            .cursor()
            .ok_or(StorageError::NoCurrentArray(handle))?;
        let slot = cursor.current().ok_or(StorageError::NoCurrentArray(handle))?;
        Ok((cursor.recno, slot, cursor.record.summaries[slot].clone()))
    }

    /// Summary of the array the search is positioned on.
    pub fn current_summary(&self, handle: Handle) -> Result<ArraySummary> {
        let (_, _, packed) = self.current_position(handle)?;
        ArraySummary::unpack(self.state(handle)?.layout, &packed)
    }

    /// Name of the array the search is positioned on.
    pub fn current_name(&mut self, handle: Handle) -> Result<String> {
        let (recno, slot, _) = self.current_position(handle)?;
        let layout = self.state(handle)?.layout;
        let record = self
            .manager
            .read_record(handle, recno + 1)?
            .ok_or_else(|| self.corrupt(handle, format!("name record {} missing", recno + 1)))?;
        Ok(layout
            .decode_names(&record, slot + 1)
            .pop()
            .unwrap_or_default())
    }

    /// Replace the summary of the current array.
    ///
    /// The begin and end addresses must stay the same.
    pub fn replace_summary(&mut self, handle: Handle, summary: &ArraySummary) -> Result<()> {
        self.manager.writable_entry(handle)?;
        let (recno, slot, old) = self.current_position(handle)?;
        let layout = self.state(handle)?.layout;
        let format = self.format(handle)?;

        let packed = summary.pack(layout)?;
        if layout.addresses(&packed)? != layout.addresses(&old)? {
            return Err(StorageError::AddressChange { handle });
        }

        let cursor = self
            .state_mut(handle)?
            .search
            .cursor_mut()
            .ok_or(StorageError::NoCurrentArray(handle))?;
        cursor.record.summaries[slot] = packed;
        let bytes = layout.encode_record(format, &cursor.record)?;
        self.manager.write_record(handle, recno, &bytes)
    }

    /// Rename the current array.
    pub fn rename_array(&mut self, handle: Handle, name: &str) -> Result<()> {
        self.manager.writable_entry(handle)?;
        let (recno, slot, _) = self.current_position(handle)?;
        let layout = self.state(handle)?.layout;
        let field = layout.name_field(name);
        self.manager
            .write_bytes(handle, recno + 1, slot * layout.name_len(), &field)
    }

    /// Every array in file order.
    pub fn arrays(&mut self, handle: Handle) -> Result<Vec<ArrayInfo>> {
        if self.state(handle)?.search.is_active() {
            return Err(StorageError::SearchInProgress(handle));
        }

        self.begin_forward_search(handle)?;
        let mut arrays = Vec::new();
        loop {
            match self.find_next(handle) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return Err(e),
            }
            let info = self.current_summary(handle).and_then(|summary| {
                let name = self.current_name(handle)?;
                Ok(ArrayInfo { name, summary })
            });
            match info {
                Ok(info) => arrays.push(info),
                Err(e) => {
                    self.end_search(handle)?;
                    return Err(e);
                }
            }
        }
        Ok(arrays)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::HandleManager;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn file_with_arrays(dir: &TempDir, count: usize) -> (HandleManager, Handle) {
        let mut manager = HandleManager::default();
        let handle = manager
            .daf()
            .open_new(dir.path().join("s.bsp"), "SPK", 1, 2, "SEARCH", 0)
            .expect("create");

        for i in 0..count {
            let summary = ArraySummary::new(vec![i as f64], vec![0, 0]);
            let mut array = manager
                .daf()
                .begin_new_array(handle, &summary, &format!("A{i}"))
                .expect("begin");
            array.append(&[i as f64; 3]).expect("append");
            array.finish().expect("end");
        }
        (manager, handle)
    }

    fn names_forward(manager: &mut HandleManager, handle: Handle) -> Vec<String> {
        let mut daf = manager.daf();
        daf.begin_forward_search(handle).expect("begin");
        let mut names = Vec::new();
        while daf.find_next(handle).expect("next") {
            names.push(daf.current_name(handle).expect("name"));
        }
        names
    }

    #[test]
    fn test_search_spans_summary_records() {
        let dir = TempDir::new().expect("dir");
        // ND=1 NI=2 gives two words per summary, 62 per record.
        let (mut manager, handle) = file_with_arrays(&dir, 70);

        let names = names_forward(&mut manager, handle);
        assert_eq!(names.len(), 70);
        assert_eq!(names[0], "A0");
        assert_eq!(names[69], "A69");
        assert!(!manager.is_locked(handle).expect("locked"));

        let mut daf = manager.daf();
        daf.begin_backward_search(handle).expect("begin");
        let mut reversed = Vec::new();
        while daf.find_prev(handle).expect("prev") {
            reversed.push(daf.current_name(handle).expect("name"));
        }
        reversed.reverse();
        assert_eq!(reversed, names);
    }

    #[test]
    fn test_direction_change_mid_search() {
        let dir = TempDir::new().expect("dir");
        let (mut manager, handle) = file_with_arrays(&dir, 3);
        let mut daf = manager.daf();

        daf.begin_forward_search(handle).expect("begin");
        assert!(daf.find_next(handle).expect("next"));
        assert!(daf.find_next(handle).expect("next"));
        assert_eq!(daf.current_name(handle).expect("name"), "A1");
        assert!(daf.find_prev(handle).expect("prev"));
        assert_eq!(daf.current_name(handle).expect("name"), "A0");
        assert_eq!(daf.search_status(handle).expect("status"), SearchStatus::Backward);
        assert!(!daf.find_prev(handle).expect("prev"));
        assert_eq!(daf.search_status(handle).expect("status"), SearchStatus::Exhausted);
        assert!(!daf.find_next(handle).expect("exhausted stays exhausted"));
    }

    #[test]
    fn test_search_locks_handle() {
        let dir = TempDir::new().expect("dir");
        let (mut manager, handle) = file_with_arrays(&dir, 2);

        manager.daf().begin_forward_search(handle).expect("begin");
        assert!(manager.is_locked(handle).expect("locked"));
        assert!(matches!(manager.close(handle), Err(StorageError::HandleLocked(_))));

        manager.daf().end_search(handle).expect("end");
        assert!(!manager.is_locked(handle).expect("locked"));
        manager.close(handle).expect("close");
    }

    #[test]
    fn test_step_without_search() {
        let dir = TempDir::new().expect("dir");
        let (mut manager, handle) = file_with_arrays(&dir, 1);
        assert!(matches!(
            manager.daf().find_next(handle),
            Err(StorageError::NoSearch(_))
        ));

        manager.daf().begin_forward_search(handle).expect("begin");
        assert!(matches!(
            manager.daf().current_summary(handle),
            Err(StorageError::NoCurrentArray(_))
        ));
    }

    #[test]
    fn test_replace_and_rename() {
        let dir = TempDir::new().expect("dir");
        let (mut manager, handle) = file_with_arrays(&dir, 2);
        let mut daf = manager.daf();

        daf.begin_forward_search(handle).expect("begin");
        assert!(daf.find_next(handle).expect("next"));
        let mut summary = daf.current_summary(handle).expect("summary");
        summary.doubles[0] = 42.0;
        daf.replace_summary(handle, &summary).expect("replace");
        daf.rename_array(handle, "RENAMED").expect("rename");

        let mut moved = summary.clone();
        moved.ints[1] += 1;
        assert!(matches!(
            daf.replace_summary(handle, &moved),
            Err(StorageError::AddressChange { .. })
        ));
        daf.end_search(handle).expect("end");

        let arrays = daf.arrays(handle).expect("arrays");
        assert_eq!(arrays[0].name, "RENAMED");
        assert_eq!(arrays[0].summary.doubles, vec![42.0]);
        assert_eq!(arrays[1].name, "A1");
    }

    #[test]
    fn test_broken_back_link_is_corruption() {
        let dir = TempDir::new().expect("dir");
        let (mut manager, handle) = file_with_arrays(&dir, 70);

        // Point the second summary record's PREV somewhere else.
        let fward = manager.daf().file_record(handle).expect("record").fward as u64;
        let next = manager
            .daf()
            .summary_record(handle, fward, 1, 1)
            .expect("read")
            .expect("present")[0] as u64;
        manager
            .write_doubles(handle, next, 1, &[(fward + 1) as f64])
            .expect("damage");

        let mut daf = manager.daf();
        daf.begin_forward_search(handle).expect("begin");
        let mut result = Ok(true);
        while let Ok(true) = result {
            result = daf.find_next(handle);
        }
        assert!(matches!(result, Err(StorageError::CorruptDirectory { .. })));
        assert_eq!(daf.search_status(handle).expect("status"), SearchStatus::Idle);
        assert!(!manager.is_locked(handle).expect("locked"));
    }
}
