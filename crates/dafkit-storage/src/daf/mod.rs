//! Double precision Array Files.
//!
//! A DAF stores named arrays of doubles. Each array is described by a
//! summary of `ND` doubles and `NI` integers whose last two integers are the
//! begin and end word addresses of its data. Summaries live in summary
//! records that form a doubly linked list from FWARD to BWARD; each summary
//! record is followed by a name record holding the array names.
//!
//! ```text
//! record 1            file record (ND, NI, FWARD, BWARD, FREE)
//! records 2..FWARD-1  reserved records (comment area)
//! record FWARD        summary record, record FWARD+1 its names
//! ...                 array data, more summary/name record pairs
//! ```
//!
//! Word addresses count doubles from the start of the file: word `a` lives
//! in record `(a - 1) / 128 + 1`.
//!
//! All operations go through [`DafFiles`], a view over a
//! [`HandleManager`] obtained with [`HandleManager::daf`].

mod array;
pub(crate) mod comments;
mod search;

pub use array::ArrayBuilder;
pub use search::SearchStatus;

use crate::handle::{HandleManager, LayerState, OpenMode};
use crate::{Handle, Result, StorageError};
use array::PendingArray;
use dafkit_formats::{
    Architecture, BinaryFormat, DOUBLES_PER_RECORD, DafFileRecord, IdWord, RECORD_BYTES,
    SummaryLayout, SummaryRecord,
};
use search::SearchState;
use std::path::Path;
use tracing::debug;

/// Array summary split into its components.
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySummary {
    /// The `ND` double components.
    pub doubles: Vec<f64>,
    /// The `NI` integer components; the last two are the data addresses.
    pub ints: Vec<i32>,
}

impl ArraySummary {
    /// Build a summary from its components.
    pub const fn new(doubles: Vec<f64>, ints: Vec<i32>) -> Self {
        Self { doubles, ints }
    }

    /// First word address of the array data.
    pub fn begin(&self) -> Option<usize> {
        let index = self.ints.len().checked_sub(2)?;
        usize::try_from(self.ints[index]).ok().filter(|a| *a > 0)
    }

    /// Last word address of the array data.
    pub fn end(&self) -> Option<usize> {
        let index = self.ints.len().checked_sub(1)?;
        usize::try_from(self.ints[index]).ok().filter(|a| *a > 0)
    }

    /// Number of doubles in the array.
    pub fn len(&self) -> usize {
        match (self.begin(), self.end()) {
            (Some(begin), Some(end)) if end >= begin => end - begin + 1,
            _ => 0,
        }
    }

    /// Whether the summary describes no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn pack(&self, layout: SummaryLayout) -> Result<Vec<f64>> {
        Ok(layout.pack(&self.doubles, &self.ints)?)
    }

    pub(crate) fn unpack(layout: SummaryLayout, packed: &[f64]) -> Result<Self> {
        let (doubles, ints) = layout.unpack(packed)?;
        Ok(Self { doubles, ints })
    }
}

/// Name and summary of one array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayInfo {
    /// Array name.
    pub name: String,
    /// Array summary.
    pub summary: ArraySummary,
}

/// Per-handle DAF state.
pub(crate) struct DafState {
    pub(crate) file_record: DafFileRecord,
    pub(crate) layout: SummaryLayout,
    pub(crate) search: SearchState,
    pub(crate) array: Option<PendingArray>,
}

/// Record holding word address `address`.
pub(crate) const fn word_record(address: usize) -> u64 {
    ((address - 1) / DOUBLES_PER_RECORD + 1) as u64
}

/// 0-based position of word address `address` within its record.
pub(crate) const fn word_offset(address: usize) -> usize {
    (address - 1) % DOUBLES_PER_RECORD
}

impl HandleManager {
    /// DAF operations over this manager.
    pub fn daf(&mut self) -> DafFiles<'_> {
        DafFiles { manager: self }
    }
}

/// DAF view of a [`HandleManager`].
pub struct DafFiles<'m> {
    pub(crate) manager: &'m mut HandleManager,
}

impl DafFiles<'_> {
    /// Open an existing DAF for reading.
    pub fn open_read<P: AsRef<Path>>(&mut self, path: P) -> Result<Handle> {
        let handle = self.manager.open(path, OpenMode::Read, Architecture::Daf)?;
        self.attach(handle)?;
        Ok(handle)
    }

    /// Open an existing DAF for reading and writing.
    pub fn open_write<P: AsRef<Path>>(&mut self, path: P) -> Result<Handle> {
        let handle = self.manager.open(path, OpenMode::Write, Architecture::Daf)?;
        self.attach(handle)?;
        Ok(handle)
    }

    /// Create a new DAF.
    ///
    /// The file gets `reserved_records` empty reserved records followed by
    /// an empty summary record and its name record.
    pub fn open_new<P: AsRef<Path>>(
        &mut self,
        path: P,
        file_type: &str,
        nd: usize,
        ni: usize,
        internal_name: &str,
        reserved_records: usize,
    ) -> Result<Handle> {
        let layout = SummaryLayout::new(nd, ni)?;
        let id = IdWord::new(Architecture::Daf, file_type)?;

        let handle = self.manager.open(path, OpenMode::New, Architecture::Daf)?;
        let format = self.manager.entry(handle)?.format;

        let mut file_record = DafFileRecord::new(&id, layout, internal_name, format);
        let fward = reserved_records + 2;
        file_record.fward = fward as i32;
        file_record.bward = fward as i32;
        file_record.free = ((fward + 1) * DOUBLES_PER_RECORD + 1) as i32;

        let result = self.initialize(handle, &file_record, layout, reserved_records);
        if let Err(e) = result {
            self.manager.discard(handle);
            return Err(e);
        }

        self.manager.entry_mut(handle)?.layer = LayerState::Daf(Box::new(DafState {
            file_record,
            layout,
            search: SearchState::Idle,
            array: None,
        }));
        debug!("Initialized DAF handle {handle} with ND={nd} NI={ni}");
        Ok(handle)
    }

    fn initialize(
        &mut self,
        handle: Handle,
        file_record: &DafFileRecord,
        layout: SummaryLayout,
        reserved_records: usize,
    ) -> Result<()> {
        let format = self.manager.entry(handle)?.format;
        self.manager
            .write_record(handle, 1, &file_record.to_bytes(format)?)?;
        for recno in 2..reserved_records + 2 {
            self.manager
                .write_record(handle, recno as u64, &[0; RECORD_BYTES])?;
        }

        let fward = file_record.fward as u64;
        let empty = layout.encode_record(format, &SummaryRecord::new(0, 0))?;
        self.manager.write_record(handle, fward, &empty)?;
        self.manager
            .write_record(handle, fward + 1, &[b' '; RECORD_BYTES])
    }

    /// Load the file record of a freshly opened handle.
    fn attach(&mut self, handle: Handle) -> Result<()> {
        if matches!(self.manager.entry(handle)?.layer, LayerState::Daf(_)) {
            return Ok(());
        }

        match self.load_state(handle) {
            Ok(state) => {
                self.manager.entry_mut(handle)?.layer = LayerState::Daf(Box::new(state));
                Ok(())
            }
            Err(e) => {
                self.manager.discard(handle);
                Err(e)
            }
        }
    }

    fn load_state(&mut self, handle: Handle) -> Result<DafState> {
        let format = self.manager.entry(handle)?.format;
        let record = self
            .manager
            .read_record(handle, 1)?
            .unwrap_or([0; RECORD_BYTES]);
        let file_record = DafFileRecord::parse(&record, format)?;
        let layout = file_record.layout()?;

        if file_record.fward < 2 || file_record.bward < file_record.fward || file_record.free < 1 {
            return Err(self.corrupt(
                handle,
                format!(
                    "file record pointers FWARD={} BWARD={} FREE={}",
                    file_record.fward, file_record.bward, file_record.free
                ),
            ));
        }

        Ok(DafState {
            file_record,
            layout,
            search: SearchState::Idle,
            array: None,
        })
    }

    pub(crate) fn state(&self, handle: Handle) -> Result<&DafState> {
        let entry = self.manager.entry(handle)?;
        match &entry.layer {
            LayerState::Daf(state) => Ok(state.as_ref()),
            _ => Err(StorageError::WrongArchitecture {
                path: entry.path.clone(),
                expected: Architecture::Daf,
                actual: entry.architecture,
            }),
        }
    }

    pub(crate) fn state_mut(&mut self, handle: Handle) -> Result<&mut DafState> {
        let entry = self.manager.entry_mut(handle)?;
        match &mut entry.layer {
            LayerState::Daf(state) => Ok(state.as_mut()),
            _ => Err(StorageError::WrongArchitecture {
                path: entry.path.clone(),
                expected: Architecture::Daf,
                actual: entry.architecture,
            }),
        }
    }

    pub(crate) fn format(&self, handle: Handle) -> Result<BinaryFormat> {
        Ok(self.manager.entry(handle)?.format)
    }

    pub(crate) fn corrupt(&self, handle: Handle, reason: String) -> StorageError {
        let path = self
            .manager
            .path_for(handle)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        tracing::warn!("Corrupt DAF {}: {reason}", path.display());
        StorageError::CorruptDirectory { path, reason }
    }

    /// Rewrite record 1 from the cached file record.
    pub(crate) fn write_file_record(&mut self, handle: Handle) -> Result<()> {
        let format = self.format(handle)?;
        let bytes = self.state(handle)?.file_record.to_bytes(format)?;
        self.manager.write_record(handle, 1, &bytes)
    }

    /// The file record as last written.
    pub fn file_record(&self, handle: Handle) -> Result<DafFileRecord> {
        Ok(self.state(handle)?.file_record.clone())
    }

    /// ND and NI of the file.
    pub fn summary_format(&self, handle: Handle) -> Result<(usize, usize)> {
        let layout = self.state(handle)?.layout;
        Ok((layout.nd(), layout.ni()))
    }

    /// Read words `begin..=end` of the file.
    ///
    /// Returns `None` when any part of the range lies past the end of the
    /// file.
    pub fn read_data(&mut self, handle: Handle, begin: usize, end: usize) -> Result<Option<Vec<f64>>> {
        if begin < 1 || end < begin {
            return Err(StorageError::InvalidAddressRange { begin, end });
        }
        self.state(handle)?;

        let records = usize::try_from(self.manager.record_count(handle)?).unwrap_or(usize::MAX);
        if end > records.saturating_mul(DOUBLES_PER_RECORD) {
            return Ok(None);
        }

        let mut data = vec![0.0; end - begin + 1];
        let mut address = begin;
        while address <= end {
            let offset = word_offset(address);
            let count = (DOUBLES_PER_RECORD - offset).min(end - address + 1);
            let start = address - begin;
            let found = self.manager.read_doubles(
                handle,
                word_record(address),
                offset,
                &mut data[start..start + count],
            )?;
            if !found {
                return Ok(None);
            }
            address += count;
        }
        Ok(Some(data))
    }

    /// Read elements `first..=last` (1-based) of an array.
    ///
    /// Returns `None` unless the range lies entirely inside the array.
    pub fn read_array_data(
        &mut self,
        handle: Handle,
        summary: &ArraySummary,
        first: usize,
        last: usize,
    ) -> Result<Option<Vec<f64>>> {
        let Some(begin) = summary.begin() else {
            return Ok(None);
        };
        if first < 1 || last < first || last > summary.len() {
            return Ok(None);
        }
        let (Some(from), Some(to)) = (begin.checked_add(first - 1), begin.checked_add(last - 1))
        else {
            return Ok(None);
        };
        self.read_data(handle, from, to)
    }

    /// Words `first..=last` (1-based) of summary record `recno` in host
    /// layout.
    ///
    /// The record is decoded as a summary record, so integer halves of a
    /// foreign-format file come back correctly packed. Returns `None` when
    /// the record does not exist.
    pub fn summary_record(
        &mut self,
        handle: Handle,
        recno: u64,
        first: usize,
        last: usize,
    ) -> Result<Option<Vec<f64>>> {
        if first < 1 || last < first || last > DOUBLES_PER_RECORD {
            return Err(StorageError::InvalidAddressRange {
                begin: first,
                end: last,
            });
        }
        let layout = self.state(handle)?.layout;
        let format = self.format(handle)?;

        let Some(record) = self.manager.read_record(handle, recno)? else {
            return Ok(None);
        };
        let decoded = layout.decode_record(format, &record)?;

        let mut words = vec![0.0; DOUBLES_PER_RECORD];
        words[0] = decoded.next as f64;
        words[1] = decoded.prev as f64;
        words[2] = decoded.nsum() as f64;
        for (i, summary) in decoded.summaries.iter().enumerate() {
            let start = 3 + i * layout.size();
            words[start..start + layout.size()].copy_from_slice(summary);
        }
        Ok(Some(words[first - 1..last].to_vec()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_word_addressing() {
        assert_eq!(word_record(1), 1);
        assert_eq!(word_record(128), 1);
        assert_eq!(word_record(129), 2);
        assert_eq!(word_offset(129), 0);
        assert_eq!(word_offset(256), 127);
    }

    #[test]
    fn test_new_file_layout() {
        let dir = TempDir::new().expect("dir");
        let mut manager = HandleManager::default();
        let handle = manager
            .daf()
            .open_new(dir.path().join("new.bsp"), "SPK", 2, 6, "NEW FILE", 3)
            .expect("create");

        let record = manager.daf().file_record(handle).expect("record");
        assert_eq!(record.fward, 5);
        assert_eq!(record.bward, 5);
        assert_eq!(record.free, 6 * 128 + 1);
        assert_eq!(record.internal_name(), "NEW FILE");
        assert_eq!(manager.daf().summary_format(handle).expect("format"), (2, 6));
        assert_eq!(manager.record_count(handle).expect("count"), 6);

        let words = manager
            .daf()
            .summary_record(handle, 5, 1, 3)
            .expect("read")
            .expect("present");
        assert_eq!(words, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_invalid_layout_rejected_before_create() {
        let dir = TempDir::new().expect("dir");
        let path = dir.path().join("bad.bsp");
        let mut manager = HandleManager::default();
        let err = manager
            .daf()
            .open_new(&path, "SPK", 2, 1, "BAD", 0)
            .expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(!path.exists());
    }

    #[test]
    fn test_read_data_range_checks() {
        let dir = TempDir::new().expect("dir");
        let mut manager = HandleManager::default();
        let handle = manager
            .daf()
            .open_new(dir.path().join("r.bsp"), "SPK", 2, 6, "R", 0)
            .expect("create");

        assert!(matches!(
            manager.daf().read_data(handle, 0, 4),
            Err(StorageError::InvalidAddressRange { .. })
        ));
        assert!(matches!(
            manager.daf().read_data(handle, 5, 4),
            Err(StorageError::InvalidAddressRange { .. })
        ));
        assert_eq!(manager.daf().read_data(handle, 1000, 1001).expect("read"), None);
        assert_eq!(manager.daf().read_data(handle, 2, usize::MAX).expect("read"), None);

        // A summary claiming far more data than the file holds.
        let oversized = ArraySummary::new(vec![0.0, 1.0], vec![0, 0, 0, 0, 1, i32::MAX]);
        assert_eq!(
            manager
                .daf()
                .read_array_data(handle, &oversized, 1, oversized.len())
                .expect("read"),
            None
        );
    }

    #[test]
    fn test_summary_accessors() {
        let summary = ArraySummary::new(vec![0.0, 1.0], vec![1, 2, 3, 4, 129, 140]);
        assert_eq!(summary.begin(), Some(129));
        assert_eq!(summary.end(), Some(140));
        assert_eq!(summary.len(), 12);

        let unset = ArraySummary::new(vec![], vec![0, 0]);
        assert_eq!(unset.begin(), None);
        assert!(unset.is_empty());
    }

    #[test]
    fn test_das_handle_rejected() {
        let dir = TempDir::new().expect("dir");
        let mut manager = HandleManager::default();
        let handle = manager
            .das()
            .open_new(dir.path().join("x.das"), "EK", "X", 0)
            .expect("create");
        assert!(matches!(
            manager.daf().summary_format(handle),
            Err(StorageError::WrongArchitecture { .. })
        ));
    }
}
