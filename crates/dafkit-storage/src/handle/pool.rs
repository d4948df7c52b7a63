//! Bounded pool of connected OS files.
//!
//! Handles outnumber the files the process may keep open. The pool keeps at
//! most `capacity` of them connected, ordered by last use. Making room
//! disconnects the least recently used file whose handle is not locked;
//! the handle itself survives and is reconnected on its next access.

use crate::{Handle, Result, StorageError};
use lru::LruCache;
use std::fs::File;
use tracing::{debug, warn};

pub(crate) struct UnitPool {
    units: LruCache<Handle, File>,
    capacity: usize,
}

impl UnitPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            units: LruCache::unbounded(),
            capacity,
        }
    }

    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.units.contains(&handle)
    }

    /// Connected file for `handle`, marked as most recently used.
    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut File> {
        self.units.get_mut(&handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.units.len()
    }

    /// Disconnect unlocked units until one more fits.
    ///
    /// Fails without touching the pool when every connected unit belongs to
    /// a locked handle.
    pub(crate) fn make_room(&mut self, is_locked: impl Fn(Handle) -> bool) -> Result<()> {
        while self.units.len() >= self.capacity {
            let victim = self
                .units
                .iter()
                .rev()
                .map(|(handle, _)| *handle)
                .find(|handle| !is_locked(*handle));

            match victim {
                Some(handle) => {
                    self.units.pop(&handle);
                    debug!("Disconnected least recently used unit of handle {handle}");
                }
                None => {
                    warn!(
                        "All {} connected units belong to locked handles",
                        self.units.len()
                    );
                    return Err(StorageError::TooManyOpenFiles {
                        resource: "units",
                        limit: self.capacity,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, handle: Handle, file: File) {
        self.units.push(handle, file);
    }

    pub(crate) fn remove(&mut self, handle: Handle) -> Option<File> {
        self.units.pop(&handle)
    }
}
