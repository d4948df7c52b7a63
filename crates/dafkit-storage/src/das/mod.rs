//! Direct Access Segregated files.
//!
//! A DAS holds three independent address spaces of characters, doubles and
//! integers. Logical addresses in each space start at 1 and grow as data is
//! appended. Physical records hold a single kind and are grouped into
//! clusters listed by directory records.
//!
//! ```text
//! record 1                file record (NRESVR, NRESVC, NCOMR, NCOMC)
//! records 2..             NRESVR reserved records, then NCOMR comment records
//! record 2+NRESVR+NCOMR   first directory record, followed by its clusters
//! ...                     further directories, each followed by its clusters
//! ```
//!
//! The directory chain is read and validated once at open; the in-memory
//! [`DirectoryIndex`](directory::DirectoryIndex) then answers every address
//! lookup and is written back whenever data is appended.

mod comments;
mod directory;
mod io;
mod segregate;

use crate::handle::{HandleManager, LayerState, OpenMode};
use crate::{Handle, Result, StorageError};
use dafkit_formats::{
    Architecture, BinaryFormat, CHARS_PER_RECORD, DOUBLES_PER_RECORD, DasFileRecord, INTS_PER_RECORD,
    IdWord, RECORD_BYTES,
};
use directory::{Directory, DirectoryIndex};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// One of the three DAS address spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataKind {
    /// Single characters.
    Char,
    /// Double precision numbers.
    Double,
    /// 32-bit integers.
    Int,
}

impl DataKind {
    /// Every kind in address-space order.
    pub const ALL: [Self; 3] = [Self::Char, Self::Double, Self::Int];

    /// Code stored in directory records.
    pub const fn code(self) -> i32 {
        match self {
            Self::Char => 1,
            Self::Double => 2,
            Self::Int => 3,
        }
    }

    /// Kind with the given directory code.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Char),
            2 => Some(Self::Double),
            3 => Some(Self::Int),
            _ => None,
        }
    }

    /// Position of the kind in per-kind arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::Char => 0,
            Self::Double => 1,
            Self::Int => 2,
        }
    }

    /// Bytes per word on disk.
    pub const fn word_bytes(self) -> usize {
        RECORD_BYTES / self.words_per_record()
    }

    /// Words in one physical record.
    pub const fn words_per_record(self) -> usize {
        match self {
            Self::Char => CHARS_PER_RECORD,
            Self::Double => DOUBLES_PER_RECORD,
            Self::Int => INTS_PER_RECORD,
        }
    }

    /// Successor in the char, double, int cycle.
    pub const fn next(self) -> Self {
        match self {
            Self::Char => Self::Double,
            Self::Double => Self::Int,
            Self::Int => Self::Char,
        }
    }

    /// Predecessor in the char, double, int cycle.
    pub const fn prev(self) -> Self {
        match self {
            Self::Char => Self::Int,
            Self::Double => Self::Char,
            Self::Int => Self::Double,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Char => "character",
            Self::Double => "double precision",
            Self::Int => "integer",
        };
        write!(f, "{name}")
    }
}

/// Bookkeeping of a DAS: area sizes and the end of each address space.
///
/// Per-kind arrays are indexed by [`DataKind::index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DasFileSummary {
    /// Reserved records.
    pub reserved_records: u64,
    /// Reserved characters in use.
    pub reserved_chars: u64,
    /// Comment records.
    pub comment_records: u64,
    /// Comment characters in use.
    pub comment_chars: u64,
    /// First record after all directories and clusters.
    pub first_free_record: u64,
    /// Last logical address of each kind, 0 when empty.
    pub last_address: [u64; 3],
    /// Record holding the last word of each kind, 0 when empty.
    pub last_record: [u64; 3],
    /// Words used in that record.
    pub last_word: [u64; 3],
}

/// Per-handle DAS state.
pub(crate) struct DasState {
    pub(crate) file_record: DasFileRecord,
    pub(crate) index: DirectoryIndex,
}

impl DasState {
    /// Record number of the first directory.
    fn first_directory(&self) -> u64 {
        2 + self.file_record.nresvr as u64 + self.file_record.ncomr as u64
    }
}

impl HandleManager {
    /// DAS operations over this manager.
    pub fn das(&mut self) -> DasFiles<'_> {
        DasFiles { manager: self }
    }
}

/// DAS view of a [`HandleManager`].
pub struct DasFiles<'m> {
    pub(crate) manager: &'m mut HandleManager,
}

impl DasFiles<'_> {
    /// Open an existing DAS for reading.
    pub fn open_read<P: AsRef<Path>>(&mut self, path: P) -> Result<Handle> {
        let handle = self.manager.open(path, OpenMode::Read, Architecture::Das)?;
        self.attach(handle)?;
        Ok(handle)
    }

    /// Open an existing DAS for reading and writing.
    pub fn open_write<P: AsRef<Path>>(&mut self, path: P) -> Result<Handle> {
        let handle = self.manager.open(path, OpenMode::Write, Architecture::Das)?;
        self.attach(handle)?;
        Ok(handle)
    }

    /// Create a new DAS.
    ///
    /// The file gets `comment_records` empty comment records followed by an
    /// empty directory record.
    pub fn open_new<P: AsRef<Path>>(
        &mut self,
        path: P,
        file_type: &str,
        internal_name: &str,
        comment_records: usize,
    ) -> Result<Handle> {
        let id = IdWord::new(Architecture::Das, file_type)?;
        let handle = self.manager.open(path, OpenMode::New, Architecture::Das)?;
        let format = self.manager.entry(handle)?.format;

        let mut file_record = DasFileRecord::new(&id, internal_name, format);
        file_record.ncomr = comment_records as i32;
        let state = DasState {
            index: DirectoryIndex::new(2 + comment_records as u64),
            file_record,
        };

        self.manager.entry_mut(handle)?.layer = LayerState::Das(Box::new(state));
        if let Err(e) = self.initialize(handle, comment_records) {
            self.manager.discard(handle);
            return Err(e);
        }
        debug!("Initialized DAS handle {handle} with {comment_records} comment records");
        Ok(handle)
    }

    fn initialize(&mut self, handle: Handle, comment_records: usize) -> Result<()> {
        self.write_file_record(handle)?;
        for recno in 2..comment_records as u64 + 2 {
            self.manager.write_record(handle, recno, &[0; RECORD_BYTES])?;
        }
        self.write_directories(handle, &[0])
    }

    fn attach(&mut self, handle: Handle) -> Result<()> {
        if matches!(self.manager.entry(handle)?.layer, LayerState::Das(_)) {
            return Ok(());
        }

        match self.load_state(handle) {
            Ok(state) => {
                self.manager.entry_mut(handle)?.layer = LayerState::Das(Box::new(state));
                Ok(())
            }
            Err(e) => {
                self.manager.discard(handle);
                Err(e)
            }
        }
    }

    fn load_state(&mut self, handle: Handle) -> Result<DasState> {
        let format = self.manager.entry(handle)?.format;
        let record = self
            .manager
            .read_record(handle, 1)?
            .unwrap_or([0; RECORD_BYTES]);
        let file_record = DasFileRecord::parse(&record, format)?;

        let counts = [
            file_record.nresvr,
            file_record.nresvc,
            file_record.ncomr,
            file_record.ncomc,
        ];
        if counts.iter().any(|c| *c < 0)
            || file_record.ncomc as u64 > file_record.ncomr as u64 * CHARS_PER_RECORD as u64
        {
            return Err(self.corrupt(
                handle,
                format!(
                    "file record counts NRESVR={} NRESVC={} NCOMR={} NCOMC={}",
                    counts[0], counts[1], counts[2], counts[3]
                ),
            ));
        }

        let first = 2 + file_record.nresvr as u64 + file_record.ncomr as u64;
        let index = self.read_index(handle, first)?;
        Ok(DasState { file_record, index })
    }

    /// Walk and validate the directory chain starting at `first`.
    fn read_index(&mut self, handle: Handle, first: u64) -> Result<DirectoryIndex> {
        let record_count = self.manager.record_count(handle)?;

        let mut directories = Vec::new();
        let mut recno = first;
        loop {
            let mut words = [0; INTS_PER_RECORD];
            if !self.manager.read_ints(handle, recno, 0, &mut words)? {
                return Err(self.corrupt(handle, format!("directory record {recno} is missing")));
            }
            let directory = Directory::decode(recno, &words).map_err(|reason| self.corrupt(handle, reason))?;

            let next = directory.next;
            if next != 0 && (next <= directory.end_record() || next > record_count) {
                return Err(self.corrupt(
                    handle,
                    format!("directory {recno} points forward to record {next}"),
                ));
            }
            directories.push(directory);
            if next == 0 {
                break;
            }
            recno = next;
        }

        DirectoryIndex::from_directories(directories, record_count)
            .map_err(|reason| self.corrupt(handle, reason))
    }

    pub(crate) fn state(&self, handle: Handle) -> Result<&DasState> {
        let entry = self.manager.entry(handle)?;
        match &entry.layer {
            LayerState::Das(state) => Ok(state.as_ref()),
            _ => Err(StorageError::WrongArchitecture {
                path: entry.path.clone(),
                expected: Architecture::Das,
                actual: entry.architecture,
            }),
        }
    }

    pub(crate) fn state_mut(&mut self, handle: Handle) -> Result<&mut DasState> {
        let entry = self.manager.entry_mut(handle)?;
        match &mut entry.layer {
            LayerState::Das(state) => Ok(state.as_mut()),
            _ => Err(StorageError::WrongArchitecture {
                path: entry.path.clone(),
                expected: Architecture::Das,
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
        warn!("Corrupt DAS {}: {reason}", path.display());
        StorageError::CorruptDirectory { path, reason }
    }

    pub(crate) fn write_file_record(&mut self, handle: Handle) -> Result<()> {
        let format = self.format(handle)?;
        let bytes = self.state(handle)?.file_record.to_bytes(format)?;
        self.manager.write_record(handle, 1, &bytes)
    }

    /// Rewrite the directories at the given index positions.
    pub(crate) fn write_directories(&mut self, handle: Handle, positions: &[usize]) -> Result<()> {
        let format = self.format(handle)?;
        for &position in positions {
            let Some(directory) = self.state(handle)?.index.directories().get(position) else {
                continue;
            };
            let recno = directory.recno;
            let mut record = [0; RECORD_BYTES];
            format.encode_i32_slice(&directory.encode(), &mut record);
            self.manager.write_record(handle, recno, &record)?;
        }
        Ok(())
    }

    /// The file record as last written.
    pub fn file_record(&self, handle: Handle) -> Result<DasFileRecord> {
        Ok(self.state(handle)?.file_record.clone())
    }

    /// Area sizes and address-space ends.
    pub fn file_summary(&self, handle: Handle) -> Result<DasFileSummary> {
        let state = self.state(handle)?;
        let record = &state.file_record;
        let index = &state.index;

        let last_address = index.last_addresses();
        let mut last_record = [0; 3];
        let mut last_word = [0; 3];
        for kind in DataKind::ALL {
            let i = kind.index();
            last_record[i] = index.last_record(kind);
            if last_address[i] > 0 {
                let per = kind.words_per_record() as u64;
                last_word[i] = (last_address[i] - 1) % per + 1;
            }
        }

        Ok(DasFileSummary {
            reserved_records: record.nresvr as u64,
            reserved_chars: record.nresvc as u64,
            comment_records: record.ncomr as u64,
            comment_chars: record.ncomc as u64,
            first_free_record: index.end_record() + 1,
            last_address,
            last_record,
            last_word,
        })
    }

    /// Last logical address of each kind (char, double, int).
    pub fn last_addresses(&self, handle: Handle) -> Result<[u64; 3]> {
        Ok(self.state(handle)?.index.last_addresses())
    }
}
