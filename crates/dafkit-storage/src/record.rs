//! Physical record I/O.
//!
//! Files are sequences of 1024-byte records numbered from 1. Reads past the
//! end of the file return `None`; a final record cut short by the file
//! length is zero padded. Each handle caches the last record it read, and
//! any write through the handle drops that cache.
//!
//! The word helpers translate between the file's binary format and host
//! values so callers above this layer only see native numbers.

use crate::handle::HandleManager;
use crate::{Handle, Result, StorageError, io_error};
use dafkit_formats::{RECORD_BYTES, Record};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Byte offset of a 1-based record number.
const fn record_offset(recno: u64) -> u64 {
    (recno - 1) * RECORD_BYTES as u64
}

/// Read one record directly from an OS file.
pub(crate) fn read_record_at(file: &mut File, recno: u64) -> io::Result<Option<Record>> {
    file.seek(SeekFrom::Start(record_offset(recno)))?;

    let mut record = [0u8; RECORD_BYTES];
    let mut filled = 0;
    while filled < RECORD_BYTES {
        match file.read(&mut record[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok((filled > 0).then_some(record))
}

fn write_record_at(file: &mut File, recno: u64, record: &Record) -> io::Result<()> {
    file.seek(SeekFrom::Start(record_offset(recno)))?;
    file.write_all(record)
}

impl HandleManager {
    /// Read record `recno` of `handle`.
    pub fn read_record(&mut self, handle: Handle, recno: u64) -> Result<Option<Record>> {
        if recno == 0 {
            return Err(StorageError::InvalidRecordNumber(recno));
        }

        if let Some((cached, record)) = &self.entry(handle)?.cache
            && *cached == recno
        {
            return Ok(Some(**record));
        }

        let result = read_record_at(self.unit(handle)?, recno);
        let entry = self.entry_mut(handle)?;
        let record = result.map_err(io_error(&entry.path))?;
        if let Some(record) = &record {
            entry.cache = Some((recno, Box::new(*record)));
        }
        Ok(record)
    }

    /// Write record `recno` of `handle`, extending the file if needed.
    pub fn write_record(&mut self, handle: Handle, recno: u64, record: &Record) -> Result<()> {
        if recno == 0 {
            return Err(StorageError::InvalidRecordNumber(recno));
        }

        self.writable_entry(handle)?.cache = None;
        let result = write_record_at(self.unit(handle)?, recno, record);
        result.map_err(io_error(&self.entry(handle)?.path))
    }

    /// Number of records in the file, counting a partial final record.
    pub fn record_count(&mut self, handle: Handle) -> Result<u64> {
        let result = self.unit(handle)?.metadata();
        let metadata = result.map_err(io_error(&self.entry(handle)?.path))?;
        Ok(metadata.len().div_ceil(RECORD_BYTES as u64))
    }

    /// Truncate or extend the file to exactly `count` records.
    pub(crate) fn set_record_count(&mut self, handle: Handle, count: u64) -> Result<()> {
        self.writable_entry(handle)?.cache = None;
        let result = self.unit(handle)?.set_len(count * RECORD_BYTES as u64);
        result.map_err(io_error(&self.entry(handle)?.path))
    }

    /// Decode doubles starting at 0-based `word` of a record.
    ///
    /// Returns `false` when the record does not exist.
    pub(crate) fn read_doubles(
        &mut self,
        handle: Handle,
        recno: u64,
        word: usize,
        out: &mut [f64],
    ) -> Result<bool> {
        let Some(record) = self.read_record(handle, recno)? else {
            return Ok(false);
        };
        let format = self.entry(handle)?.format;
        format.decode_f64_slice(&record[word * 8..], out);
        Ok(true)
    }

    /// Decode integers starting at 0-based `word` of a record.
    pub(crate) fn read_ints(
        &mut self,
        handle: Handle,
        recno: u64,
        word: usize,
        out: &mut [i32],
    ) -> Result<bool> {
        let Some(record) = self.read_record(handle, recno)? else {
            return Ok(false);
        };
        let format = self.entry(handle)?.format;
        format.decode_i32_slice(&record[word * 4..], out);
        Ok(true)
    }

    /// Overwrite doubles starting at 0-based `word` of a record.
    ///
    /// The rest of the record is preserved; a record past the end of the
    /// file starts out zeroed.
    pub(crate) fn write_doubles(
        &mut self,
        handle: Handle,
        recno: u64,
        word: usize,
        values: &[f64],
    ) -> Result<()> {
        let mut record = self.read_record(handle, recno)?.unwrap_or([0; RECORD_BYTES]);
        let format = self.entry(handle)?.format;
        format.encode_f64_slice(values, &mut record[word * 8..])?;
        self.write_record(handle, recno, &record)
    }

    /// Overwrite raw bytes starting at `offset` of a record.
    pub(crate) fn write_bytes(
        &mut self,
        handle: Handle,
        recno: u64,
        offset: usize,
        bytes: &[u8],
    ) -> Result<()> {
        let mut record = self.read_record(handle, recno)?.unwrap_or([0; RECORD_BYTES]);
        record[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.write_record(handle, recno, &record)
    }
}
