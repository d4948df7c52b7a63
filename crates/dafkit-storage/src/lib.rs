//! Handle manager, record I/O and directory layers for DAF and DAS files.
//!
//! The crate owns everything that touches the file system:
//!
//! - **Handle manager**: a bounded table of open files keyed by small integer
//!   handles, multiplexed over a smaller LRU pool of OS files
//! - **Record I/O**: 1024-byte direct-access records with a one-record cache
//!   per handle
//! - **DAF layer**: named double precision arrays with linked summary
//!   records, forward/backward search, append and comment area
//! - **DAS layer**: segregated character, double and integer address spaces
//!   described by linked directory records
//!
//! # Example
//!
//! ```rust,no_run
//! use dafkit_storage::{ArraySummary, HandleManager};
//!
//! # fn example() -> dafkit_storage::Result<()> {
//! let mut manager = HandleManager::default();
//! let handle = manager
//!     .daf()
//!     .open_new("ephemeris.bsp", "SPK", 2, 6, "TEST", 0)?;
//!
//! let summary = ArraySummary::new(vec![0.0, 86400.0], vec![399, 10, 1, 2, 0, 0]);
//! let mut array = manager.daf().begin_new_array(handle, &summary, "EARTH")?;
//! array.append(&[1.0, 2.0, 3.0])?;
//! array.finish()?;
//!
//! manager.close(handle)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use dafkit_formats::{Architecture, BinaryFormat, FormatError};
use std::path::{Path, PathBuf};
use thiserror::Error;

// Configuration
pub mod config;

// Handle table and unit pool
pub mod handle;

// Physical record access
pub mod record;

// Double precision Array Files
pub mod daf;

// Direct Access Segregated files
pub mod das;

pub use config::ManagerConfig;
pub use daf::{ArrayBuilder, ArrayInfo, ArraySummary, DafFiles, SearchStatus};
pub use das::{DasFileSummary, DasFiles, DataKind};
pub use handle::{AccessMode, Handle, HandleInfo, HandleManager, OpenMode, SharedHandleManager};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Broad classification of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A bounded table or pool is full.
    ResourceExhausted,
    /// File content is unrecognized, inconsistent or corrupt.
    Format,
    /// The caller asked for something the current state does not allow.
    Usage,
    /// The operating system reported a failure.
    Io,
}

/// Errors raised by handle, record and directory operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O failure on a specific file.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Record or format decoding failed.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Handle table or unit pool is full.
    #[error("Too many open files: {resource} limit of {limit} reached")]
    TooManyOpenFiles {
        /// Which bound was hit.
        resource: &'static str,
        /// The configured bound.
        limit: usize,
    },

    /// Handle is not in the table.
    #[error("Invalid handle {0}")]
    InvalidHandle(Handle),

    /// Path is already open in an incompatible mode.
    #[error("{} is already open as handle {handle} in an incompatible mode", path.display())]
    OpenConflict {
        /// Canonical path.
        path: PathBuf,
        /// Existing handle.
        handle: Handle,
    },

    /// Create-new on a path that exists.
    #[error("File already exists: {}", .0.display())]
    FileExists(PathBuf),

    /// Write access requested on a file in a foreign binary format.
    #[error("{} is in {format} format and can only be opened for reading", path.display())]
    NonNativeWrite {
        /// Canonical path.
        path: PathBuf,
        /// Format of the file.
        format: BinaryFormat,
    },

    /// File or handle belongs to the other architecture.
    #[error("{} is a {actual} file, expected {expected}", path.display())]
    WrongArchitecture {
        /// Canonical path.
        path: PathBuf,
        /// Architecture the operation requires.
        expected: Architecture,
        /// Architecture of the file.
        actual: Architecture,
    },

    /// Write on a handle opened for reading.
    #[error("Handle {0} is open for reading only")]
    ReadOnlyHandle(Handle),

    /// Close of a locked handle.
    #[error("Handle {0} is locked")]
    HandleLocked(Handle),

    /// Unlock of a handle that is not locked.
    #[error("Handle {0} is not locked")]
    NotLocked(Handle),

    /// An array is being written on this handle.
    #[error("An array is in progress on handle {0}")]
    ArrayInProgress(Handle),

    /// Array operation without a preceding begin.
    #[error("No array is in progress on handle {0}")]
    NoArrayInProgress(Handle),

    /// Operation not allowed while a search is active.
    #[error("A search is in progress on handle {0}")]
    SearchInProgress(Handle),

    /// Search step without a preceding begin.
    #[error("No search has been started on handle {0}")]
    NoSearch(Handle),

    /// Search is not positioned on an array.
    #[error("Search on handle {0} is not positioned on an array")]
    NoCurrentArray(Handle),

    /// End of an array that received no data.
    #[error("Array on handle {0} contains no data")]
    EmptyArray(Handle),

    /// Summary replacement that would move the array.
    #[error("Summary replacement on handle {handle} changes the array addresses")]
    AddressChange {
        /// Handle searched.
        handle: Handle,
    },

    /// Invalid DAF word address range.
    #[error("Invalid address range {begin}..={end}")]
    InvalidAddressRange {
        /// First word address.
        begin: usize,
        /// Last word address.
        end: usize,
    },

    /// DAS logical address range outside the data written.
    #[error("{kind} addresses {first}..={last} outside 1..={limit}")]
    AddressOutOfRange {
        /// Address space.
        kind: DataKind,
        /// First address requested.
        first: u64,
        /// Last address requested.
        last: u64,
        /// Last address in use.
        limit: u64,
    },

    /// Record number zero.
    #[error("Invalid record number {0}")]
    InvalidRecordNumber(u64),

    /// Directory structure is inconsistent.
    #[error("Corrupt directory in {}: {reason}", path.display())]
    CorruptDirectory {
        /// Canonical path.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Comment line with characters the comment area cannot hold.
    #[error("Invalid comment line: {0:?}")]
    InvalidComment(String),
}

impl StorageError {
    /// Classify the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TooManyOpenFiles { .. } => ErrorKind::ResourceExhausted,
            Self::Format(_)
            | Self::NonNativeWrite { .. }
            | Self::WrongArchitecture { .. }
            | Self::CorruptDirectory { .. } => ErrorKind::Format,
            Self::Io { .. } => ErrorKind::Io,
            _ => ErrorKind::Usage,
        }
    }
}

/// Wrap an OS error with the file it concerns.
pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Version information for the storage crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
