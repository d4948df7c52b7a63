//! Reading, appending and updating DAS data.
//!
//! All three kinds share one byte-level path; the typed methods only
//! translate between host values and the file's binary format.

use super::{DasFiles, DataKind};
use crate::{Handle, Result, StorageError};
use dafkit_formats::RECORD_BYTES;
use tracing::debug;

impl DasFiles<'_> {
    /// Append raw words of `kind` to the end of its address space.
    ///
    /// `bytes` holds whole words already encoded in the file's format.
    pub(crate) fn append_raw(
        &mut self,
        handle: Handle,
        kind: DataKind,
        bytes: &[u8],
    ) -> Result<()> {
        self.manager.writable_entry(handle)?;
        let word_bytes = kind.word_bytes();
        let words = (bytes.len() / word_bytes) as u64;
        if words == 0 {
            return Ok(());
        }

        let mut index = self.state(handle)?.index.clone();
        let growth = index
            .grow(kind, words)
            .map_err(|reason| self.corrupt(handle, reason))?;

        let mut rest = bytes;
        if let Some((recno, word, count)) = growth.fill {
            let (head, tail) = rest.split_at(count as usize * word_bytes);
            self.manager
                .write_bytes(handle, recno, word as usize * word_bytes, head)?;
            rest = tail;
        }
        if let Some((first, records)) = growth.run {
            for (recno, chunk) in (first..first + records).zip(rest.chunks(RECORD_BYTES)) {
                let mut record = [0; RECORD_BYTES];
                record[..chunk.len()].copy_from_slice(chunk);
                self.manager.write_record(handle, recno, &record)?;
            }
        }

        self.state_mut(handle)?.index = index;
        self.write_directories(handle, &growth.dirty)?;
        debug!("Appended {words} {kind} words on handle {handle}");
        Ok(())
    }

    /// Check that `first..=last` lies inside the address space of `kind`.
    fn check_range(&self, handle: Handle, kind: DataKind, first: u64, last: u64) -> Result<()> {
        let limit = self.state(handle)?.index.last_address(kind);
        if first < 1 || last < first || last > limit {
            return Err(StorageError::AddressOutOfRange {
                kind,
                first,
                last,
                limit,
            });
        }
        Ok(())
    }

    /// Visit each record spanned by `first..=last` of `kind`.
    ///
    /// The callback receives the physical record, the byte offset inside it
    /// and the byte range within the whole request.
    fn for_each_span<F>(
        &mut self,
        handle: Handle,
        kind: DataKind,
        first: u64,
        last: u64,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(&mut Self, u64, usize, std::ops::Range<usize>) -> Result<()>,
    {
        let per = kind.words_per_record() as u64;
        let word_bytes = kind.word_bytes();
        let extents = self.state(handle)?.index.extents(kind);

        let mut address = first;
        while address <= last {
            let index = (address - 1) / per;
            let offset = (address - 1) % per;
            let count = (per - offset).min(last - address + 1);

            let recno = extents
                .iter()
                .find(|e| index >= e.first_index && index < e.first_index + e.records)
                .map(|e| e.recno + index - e.first_index)
                .ok_or_else(|| {
                    self.corrupt(handle, format!("no record holds {kind} address {address}"))
                })?;

            let start = (address - first) as usize * word_bytes;
            let span = start..start + count as usize * word_bytes;
            visit(self, recno, offset as usize * word_bytes, span)?;
            address += count;
        }
        Ok(())
    }

    /// Raw bytes of words `first..=last` of `kind`.
    pub(crate) fn read_raw(
        &mut self,
        handle: Handle,
        kind: DataKind,
        first: u64,
        last: u64,
    ) -> Result<Vec<u8>> {
        self.check_range(handle, kind, first, last)?;
        let mut bytes = vec![0; (last - first + 1) as usize * kind.word_bytes()];

        self.for_each_span(handle, kind, first, last, |das, recno, offset, span| {
            let record = das.manager.read_record(handle, recno)?.ok_or_else(|| {
                das.corrupt(handle, format!("{kind} record {recno} is missing"))
            })?;
            let len = span.len();
            bytes[span].copy_from_slice(&record[offset..offset + len]);
            Ok(())
        })?;
        Ok(bytes)
    }

    /// Overwrite existing words of `kind` starting at `first`.
    pub(crate) fn update_raw(
        &mut self,
        handle: Handle,
        kind: DataKind,
        first: u64,
        bytes: &[u8],
    ) -> Result<()> {
        self.manager.writable_entry(handle)?;
        let words = (bytes.len() / kind.word_bytes()) as u64;
        if words == 0 {
            return Ok(());
        }
        let Some(last) = first.checked_add(words - 1) else {
            return Err(StorageError::AddressOutOfRange {
                kind,
                first,
                last: u64::MAX,
                limit: self.state(handle)?.index.last_address(kind),
            });
        };
        self.check_range(handle, kind, first, last)?;

        self.for_each_span(handle, kind, first, last, |das, recno, offset, span| {
            das.manager.write_bytes(handle, recno, offset, &bytes[span])
        })
    }

    /// Append characters.
    pub fn add_chars(&mut self, handle: Handle, chars: &[u8]) -> Result<()> {
        self.append_raw(handle, DataKind::Char, chars)
    }

    /// Append doubles.
    pub fn add_doubles(&mut self, handle: Handle, values: &[f64]) -> Result<()> {
        let bytes = self.encode_doubles(handle, values)?;
        self.append_raw(handle, DataKind::Double, &bytes)
    }

    /// Append integers.
    pub fn add_ints(&mut self, handle: Handle, values: &[i32]) -> Result<()> {
        let bytes = self.encode_ints(handle, values)?;
        self.append_raw(handle, DataKind::Int, &bytes)
    }

    /// Characters at addresses `first..=last`.
    pub fn read_chars(&mut self, handle: Handle, first: u64, last: u64) -> Result<Vec<u8>> {
        self.read_raw(handle, DataKind::Char, first, last)
    }

    /// Doubles at addresses `first..=last`.
    pub fn read_doubles(&mut self, handle: Handle, first: u64, last: u64) -> Result<Vec<f64>> {
        let bytes = self.read_raw(handle, DataKind::Double, first, last)?;
        let mut values = vec![0.0; bytes.len() / 8];
        self.format(handle)?.decode_f64_slice(&bytes, &mut values);
        Ok(values)
    }

    /// Integers at addresses `first..=last`.
    pub fn read_ints(&mut self, handle: Handle, first: u64, last: u64) -> Result<Vec<i32>> {
        let bytes = self.read_raw(handle, DataKind::Int, first, last)?;
        let mut values = vec![0; bytes.len() / 4];
        self.format(handle)?.decode_i32_slice(&bytes, &mut values);
        Ok(values)
    }

    /// Overwrite characters starting at `first`.
    pub fn update_chars(&mut self, handle: Handle, first: u64, chars: &[u8]) -> Result<()> {
        self.update_raw(handle, DataKind::Char, first, chars)
    }

    /// Overwrite doubles starting at `first`.
    pub fn update_doubles(&mut self, handle: Handle, first: u64, values: &[f64]) -> Result<()> {
        let bytes = self.encode_doubles(handle, values)?;
        self.update_raw(handle, DataKind::Double, first, &bytes)
    }

    /// Overwrite integers starting at `first`.
    pub fn update_ints(&mut self, handle: Handle, first: u64, values: &[i32]) -> Result<()> {
        let bytes = self.encode_ints(handle, values)?;
        self.update_raw(handle, DataKind::Int, first, &bytes)
    }

    fn encode_doubles(&self, handle: Handle, values: &[f64]) -> Result<Vec<u8>> {
        let mut bytes = vec![0; values.len() * 8];
        self.format(handle)?.encode_f64_slice(values, &mut bytes)?;
        Ok(bytes)
    }

    fn encode_ints(&self, handle: Handle, values: &[i32]) -> Result<Vec<u8>> {
        let mut bytes = vec![0; values.len() * 4];
        self.format(handle)?.encode_i32_slice(values, &mut bytes);
        Ok(bytes)
    }
}
