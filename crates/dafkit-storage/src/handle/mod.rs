//! Handle table.
//!
//! Every open DAF or DAS file is identified by a [`Handle`]. The table maps
//! handles to their canonical path, architecture, binary format, access
//! mode, link and lock counts, record cache and layer state. OS files are
//! connected lazily through a bounded [`UnitPool`](pool::UnitPool), so the
//! number of handles can exceed the number of descriptors the process holds.
//!
//! Opening a path that is already open for reading, again for reading,
//! returns the same handle with one more link. Each close removes one link;
//! the entry goes away with the last one.

mod pool;

use crate::config::ManagerConfig;
use crate::daf::DafState;
use crate::das::DasState;
use crate::record::read_record_at;
use crate::{Result, StorageError, io_error};
use dafkit_formats::daf_record::DAF_FORMAT_OFFSET;
use dafkit_formats::{
    Architecture, BinaryFormat, DafFileRecord, DasFileRecord, IdWord, Record, ftp,
};
use parking_lot::Mutex;
use pool::UnitPool;
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle manager shared between threads of one process.
pub type SharedHandleManager = Arc<Mutex<HandleManager>>;

/// Identifier of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    /// Wrap a raw handle number.
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Raw handle number.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access granted to a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Read-write access.
    Write,
}

impl AccessMode {
    /// Check if this mode allows writes.
    pub const fn can_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

/// How to open a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Existing file, read-only.
    Read,
    /// Existing file, read-write.
    Write,
    /// New file; the path must not exist.
    New,
}

impl OpenMode {
    /// Access the resulting handle has.
    pub const fn access(self) -> AccessMode {
        match self {
            Self::Read => AccessMode::Read,
            Self::Write | Self::New => AccessMode::Write,
        }
    }
}

/// Snapshot of a table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleInfo {
    /// The handle.
    pub handle: Handle,
    /// Canonical path.
    pub path: PathBuf,
    /// File architecture.
    pub architecture: Architecture,
    /// Binary format of the file.
    pub format: BinaryFormat,
    /// Access mode.
    pub access: AccessMode,
    /// Number of opens not yet matched by a close.
    pub links: u32,
    /// Lock nesting depth.
    pub locks: u32,
    /// Whether an OS file is currently connected.
    pub connected: bool,
}

/// Architecture specific state of an entry.
pub(crate) enum LayerState {
    /// Opened through the manager but not yet attached to a layer.
    Pending,
    Daf(Box<DafState>),
    Das(Box<DasState>),
}

impl LayerState {
    fn array_in_progress(&self) -> bool {
        matches!(self, Self::Daf(state) if state.array.is_some())
    }
}

pub(crate) struct FileEntry {
    pub(crate) path: PathBuf,
    pub(crate) architecture: Architecture,
    pub(crate) format: BinaryFormat,
    pub(crate) access: AccessMode,
    links: u32,
    locks: u32,
    pub(crate) cache: Option<(u64, Box<Record>)>,
    pub(crate) layer: LayerState,
}

/// Table of open DAF and DAS files.
pub struct HandleManager {
    config: ManagerConfig,
    files: HashMap<Handle, FileEntry>,
    paths: HashMap<PathBuf, Handle>,
    units: UnitPool,
    next_handle: u32,
}

impl Default for HandleManager {
    fn default() -> Self {
        let config = ManagerConfig::default();
        Self {
            units: UnitPool::new(config.max_units),
            config,
            files: HashMap::new(),
            paths: HashMap::new(),
            next_handle: 1,
        }
    }
}

impl HandleManager {
    /// Create a manager with validated capacities.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            units: UnitPool::new(config.max_units),
            config,
            files: HashMap::new(),
            paths: HashMap::new(),
            next_handle: 1,
        })
    }

    /// Wrap the manager for use from several threads.
    pub fn shared(self) -> SharedHandleManager {
        Arc::new(Mutex::new(self))
    }

    /// Active configuration.
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Open `path` and validate its file record.
    ///
    /// Existing files must carry a recognized ID word of the requested
    /// architecture, an intact FTP validation string and a known binary
    /// format. [`OpenMode::New`] creates an empty file in the host format;
    /// the DAF and DAS layers write its first records.
    pub fn open<P: AsRef<Path>>(
        &mut self,
        path: P,
        mode: OpenMode,
        architecture: Architecture,
    ) -> Result<Handle> {
        let path = path.as_ref();
        if mode == OpenMode::New {
            return self.create(path, architecture);
        }

        let canonical = path.canonicalize().map_err(io_error(path))?;
        if let Some(&handle) = self.paths.get(&canonical) {
            return self.reopen(handle, mode, architecture);
        }

        self.ensure_table_space()?;
        self.make_unit_room()?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(mode == OpenMode::Write)
            .open(&canonical)
            .map_err(io_error(&canonical))?;
        let first = read_record_at(&mut file, 1)
            .map_err(io_error(&canonical))?
            .unwrap_or([0; dafkit_formats::RECORD_BYTES]);

        let (actual, format) = identify(&first, &canonical)?;
        if actual != architecture {
            warn!("Rejected {}: {actual} file opened as {architecture}", canonical.display());
            return Err(StorageError::WrongArchitecture {
                path: canonical,
                expected: architecture,
                actual,
            });
        }
        if mode == OpenMode::Write && !format.is_native() {
            warn!("Rejected write access to {} ({format})", canonical.display());
            return Err(StorageError::NonNativeWrite {
                path: canonical,
                format,
            });
        }

        let handle = self.insert(canonical, architecture, format, mode.access());
        self.units.insert(handle, file);
        if let Some(entry) = self.files.get_mut(&handle) {
            entry.cache = Some((1, Box::new(first)));
            info!(
                "Opened {} as handle {handle} ({architecture}, {format}, {:?})",
                entry.path.display(),
                entry.access
            );
        }
        Ok(handle)
    }

    fn create(&mut self, path: &Path, architecture: Architecture) -> Result<Handle> {
        if path.exists() {
            return Err(StorageError::FileExists(path.to_path_buf()));
        }

        self.ensure_table_space()?;
        self.make_unit_room()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    StorageError::FileExists(path.to_path_buf())
                } else {
                    io_error(path)(source)
                }
            })?;
        let canonical = path.canonicalize().map_err(io_error(path))?;

        let format = BinaryFormat::native();
        let handle = self.insert(canonical, architecture, format, AccessMode::Write);
        self.units.insert(handle, file);
        info!(
            "Created {} as handle {handle} ({architecture}, {format})",
            path.display()
        );
        Ok(handle)
    }

    fn reopen(&mut self, handle: Handle, mode: OpenMode, architecture: Architecture) -> Result<Handle> {
        let entry = self
            .files
            .get_mut(&handle)
            .ok_or(StorageError::InvalidHandle(handle))?;

        if entry.architecture != architecture {
            return Err(StorageError::WrongArchitecture {
                path: entry.path.clone(),
                expected: architecture,
                actual: entry.architecture,
            });
        }
        if mode != OpenMode::Read || entry.access != AccessMode::Read {
            warn!(
                "Rejected {mode:?} open of {}: already open as handle {handle}",
                entry.path.display()
            );
            return Err(StorageError::OpenConflict {
                path: entry.path.clone(),
                handle,
            });
        }

        entry.links += 1;
        debug!("Reopened handle {handle}, {} links", entry.links);
        Ok(handle)
    }

    fn ensure_table_space(&self) -> Result<()> {
        if self.files.len() >= self.config.max_files {
            warn!("Handle table full ({} files)", self.files.len());
            return Err(StorageError::TooManyOpenFiles {
                resource: "files",
                limit: self.config.max_files,
            });
        }
        Ok(())
    }

    fn make_unit_room(&mut self) -> Result<()> {
        let files = &self.files;
        self.units
            .make_room(|handle| files.get(&handle).is_some_and(|entry| entry.locks > 0))
    }

    fn insert(
        &mut self,
        path: PathBuf,
        architecture: Architecture,
        format: BinaryFormat,
        access: AccessMode,
    ) -> Handle {
        let handle = Handle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1).max(1);

        self.paths.insert(path.clone(), handle);
        self.files.insert(
            handle,
            FileEntry {
                path,
                architecture,
                format,
                access,
                links: 1,
                locks: 0,
                cache: None,
                layer: LayerState::Pending,
            },
        );
        handle
    }

    /// Drop one link to `handle`; the last link releases the file.
    ///
    /// The last close fails while a DAF array is in progress or the handle
    /// is locked.
    pub fn close(&mut self, handle: Handle) -> Result<()> {
        let entry = self
            .files
            .get_mut(&handle)
            .ok_or(StorageError::InvalidHandle(handle))?;

        if entry.links > 1 {
            entry.links -= 1;
            debug!("Released link to handle {handle}, {} remain", entry.links);
            return Ok(());
        }
        if entry.layer.array_in_progress() {
            warn!("Refused to close handle {handle}: array in progress");
            return Err(StorageError::ArrayInProgress(handle));
        }
        if entry.locks > 0 {
            warn!("Refused to close handle {handle}: locked");
            return Err(StorageError::HandleLocked(handle));
        }

        let sync = self.config.sync_on_close && entry.access.can_write();
        let file = self.units.remove(handle);
        if let (true, Some(file)) = (sync, &file) {
            file.sync_all().map_err(io_error(&entry.path))?;
        }

        self.discard(handle);
        Ok(())
    }

    /// Remove an entry regardless of links and locks.
    pub(crate) fn discard(&mut self, handle: Handle) {
        self.units.remove(handle);
        if let Some(entry) = self.files.remove(&handle) {
            self.paths.remove(&entry.path);
            info!("Closed handle {handle} ({})", entry.path.display());
        }
    }

    /// Increase the lock depth of `handle`.
    ///
    /// A locked handle keeps its unit connected and cannot be closed.
    pub fn lock(&mut self, handle: Handle) -> Result<()> {
        let entry = self.entry_mut(handle)?;
        entry.locks += 1;
        Ok(())
    }

    /// Decrease the lock depth of `handle`.
    pub fn unlock(&mut self, handle: Handle) -> Result<()> {
        let entry = self.entry_mut(handle)?;
        if entry.locks == 0 {
            return Err(StorageError::NotLocked(handle));
        }
        entry.locks -= 1;
        Ok(())
    }

    /// Whether `handle` is locked.
    pub fn is_locked(&self, handle: Handle) -> Result<bool> {
        Ok(self.entry(handle)?.locks > 0)
    }

    /// Handle of an open path.
    pub fn handle_for<P: AsRef<Path>>(&self, path: P) -> Option<Handle> {
        let path = path.as_ref();
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.paths.get(&canonical).copied()
    }

    /// Canonical path of an open handle.
    pub fn path_for(&self, handle: Handle) -> Option<&Path> {
        self.files.get(&handle).map(|entry| entry.path.as_path())
    }

    /// Snapshot of a handle's table entry.
    pub fn info(&self, handle: Handle) -> Result<HandleInfo> {
        let entry = self.entry(handle)?;
        Ok(HandleInfo {
            handle,
            path: entry.path.clone(),
            architecture: entry.architecture,
            format: entry.format,
            access: entry.access,
            links: entry.links,
            locks: entry.locks,
            connected: self.units.contains(handle),
        })
    }

    /// Every open handle in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.files.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Number of OS files currently connected.
    pub fn connected_units(&self) -> usize {
        self.units.len()
    }

    pub(crate) fn entry(&self, handle: Handle) -> Result<&FileEntry> {
        self.files
            .get(&handle)
            .ok_or(StorageError::InvalidHandle(handle))
    }

    pub(crate) fn entry_mut(&mut self, handle: Handle) -> Result<&mut FileEntry> {
        self.files
            .get_mut(&handle)
            .ok_or(StorageError::InvalidHandle(handle))
    }

    /// Entry of a handle that must allow writes.
    pub(crate) fn writable_entry(&mut self, handle: Handle) -> Result<&mut FileEntry> {
        let entry = self.entry_mut(handle)?;
        if !entry.access.can_write() {
            return Err(StorageError::ReadOnlyHandle(handle));
        }
        Ok(entry)
    }

    /// Connected OS file of `handle`, reconnecting it if it was evicted.
    pub(crate) fn unit(&mut self, handle: Handle) -> Result<&mut File> {
        if !self.units.contains(handle) {
            let entry = self.entry(handle)?;
            let path = entry.path.clone();
            let write = entry.access.can_write();

            self.make_unit_room()?;
            let file = OpenOptions::new()
                .read(true)
                .write(write)
                .open(&path)
                .map_err(io_error(&path))?;
            debug!("Connected unit for handle {handle} ({})", path.display());
            self.units.insert(handle, file);
        }

        self.units
            .get_mut(handle)
            .ok_or(StorageError::InvalidHandle(handle))
    }
}

/// Architecture and binary format of a raw file record.
fn identify(record: &Record, path: &Path) -> Result<(Architecture, BinaryFormat)> {
    let id = IdWord::parse(&record[..dafkit_formats::idword::ID_WORD_LEN])?;
    ftp::check_record(record)?;

    let format = match id.architecture() {
        Architecture::Daf => {
            let label = &record[DAF_FORMAT_OFFSET..DAF_FORMAT_OFFSET + 8];
            let format = DafFileRecord::detect_format(record)?;
            if label.iter().all(|b| *b == b' ' || *b == 0) {
                warn!(
                    "{} has no binary format label, inferred {format}",
                    path.display()
                );
            }
            format
        }
        Architecture::Das => DasFileRecord::detect_format(record)?,
    };

    Ok((id.architecture(), format))
}
