//! DAS directory records and the in-memory cluster index.
//!
//! ```text
//! word 0      backward pointer (0 for the first directory)
//! word 1      forward pointer (0 for the last directory)
//! words 2..8  first/last logical address covered, per kind (0 = none)
//! word 8      kind code of the first cluster
//! words 9..   cluster record counts, sign gives the kind step, 0 ends
//! ```
//!
//! A cluster is a run of data records of one kind placed right after its
//! directory. Directories appear in strictly increasing record order, which
//! rules out cycles.

use super::DataKind;
use dafkit_formats::INTS_PER_RECORD;

/// Cluster slots in one directory record.
pub(crate) const DIRECTORY_CLUSTERS: usize = INTS_PER_RECORD - CLUSTER_START;

const CLUSTER_START: usize = 9;
const FIRST_KIND: usize = 8;

/// Directory decoding and index validation failure, as a readable reason.
pub(crate) type Invalid = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cluster {
    pub(crate) kind: DataKind,
    pub(crate) records: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Directory {
    pub(crate) recno: u64,
    pub(crate) prev: u64,
    pub(crate) next: u64,
    /// First and last logical address per kind.
    pub(crate) ranges: [Option<(u64, u64)>; 3],
    pub(crate) clusters: Vec<Cluster>,
}

impl Directory {
    pub(crate) const fn empty(recno: u64, prev: u64) -> Self {
        Self {
            recno,
            prev,
            next: 0,
            ranges: [None; 3],
            clusters: Vec::new(),
        }
    }

    pub(crate) fn decode(recno: u64, words: &[i32; INTS_PER_RECORD]) -> Result<Self, Invalid> {
        let pointer = |index: usize| {
            u64::try_from(words[index])
                .map_err(|_| format!("directory {recno} has negative word {index}"))
        };

        let mut ranges = [None; 3];
        for kind in DataKind::ALL {
            let first = pointer(2 + 2 * kind.index())?;
            let last = pointer(3 + 2 * kind.index())?;
            ranges[kind.index()] = match (first, last) {
                (0, 0) => None,
                (first, last) if first > 0 && last >= first => Some((first, last)),
                _ => {
                    return Err(format!(
                        "directory {recno} has {kind} range {first}..{last}"
                    ));
                }
            };
        }

        let mut clusters = Vec::new();
        let mut kind = None;
        for &count in &words[CLUSTER_START..] {
            if count == 0 {
                break;
            }
            let next = match kind {
                None => DataKind::from_code(words[FIRST_KIND]).ok_or_else(|| {
                    format!("directory {recno} has kind code {}", words[FIRST_KIND])
                })?,
                Some(previous) if count > 0 => DataKind::next(previous),
                Some(previous) => DataKind::prev(previous),
            };
            clusters.push(Cluster {
                kind: next,
                records: u64::from(count.unsigned_abs()),
            });
            kind = Some(next);
        }

        Ok(Self {
            recno,
            prev: pointer(0)?,
            next: pointer(1)?,
            ranges,
            clusters,
        })
    }

    pub(crate) fn encode(&self) -> [i32; INTS_PER_RECORD] {
        let mut words = [0; INTS_PER_RECORD];
        words[0] = self.prev as i32;
        words[1] = self.next as i32;
        for kind in DataKind::ALL {
            if let Some((first, last)) = self.ranges[kind.index()] {
                words[2 + 2 * kind.index()] = first as i32;
                words[3 + 2 * kind.index()] = last as i32;
            }
        }

        let mut previous: Option<DataKind> = None;
        for (slot, cluster) in self.clusters.iter().enumerate() {
            let count = cluster.records as i32;
            words[CLUSTER_START + slot] = match previous {
                None => {
                    words[FIRST_KIND] = cluster.kind.code();
                    count
                }
                Some(kind) if kind.next() == cluster.kind => count,
                Some(_) => -count,
            };
            previous = Some(cluster.kind);
        }
        words
    }

    pub(crate) fn data_records(&self) -> u64 {
        self.clusters.iter().map(|c| c.records).sum()
    }

    /// Last record used by this directory and its clusters.
    pub(crate) fn end_record(&self) -> u64 {
        self.recno + self.data_records()
    }

    pub(crate) fn records_of(&self, kind: DataKind) -> u64 {
        self.clusters
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.records)
            .sum()
    }
}

/// Run of consecutive physical records holding one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extent {
    /// 0-based index of the first record within the kind's address space.
    pub(crate) first_index: u64,
    pub(crate) recno: u64,
    pub(crate) records: u64,
}

/// Space added by [`DirectoryIndex::grow`].
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Growth {
    /// Partially used record topped up first: record, word offset, words.
    pub(crate) fill: Option<(u64, u64, u64)>,
    /// Fresh records: first record number and count.
    pub(crate) run: Option<(u64, u64)>,
    /// Positions of directories whose records must be rewritten.
    pub(crate) dirty: Vec<usize>,
}

/// Every directory of a file in file order, with the derived last logical
/// address of each kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirectoryIndex {
    directories: Vec<Directory>,
    last: [u64; 3],
}

impl DirectoryIndex {
    /// Index of a file holding one empty directory.
    pub(crate) fn new(first_directory: u64) -> Self {
        Self {
            directories: vec![Directory::empty(first_directory, 0)],
            last: [0; 3],
        }
    }

    /// Check a chain of decoded directories against each other and the
    /// file length.
    pub(crate) fn from_directories(
        directories: Vec<Directory>,
        record_count: u64,
    ) -> Result<Self, Invalid> {
        if directories.is_empty() {
            return Err("file has no directory record".to_string());
        }

        let mut last = [0; 3];
        let mut prev = 0;
        let mut prev_end = 0;
        for directory in &directories {
            let recno = directory.recno;
            if directory.prev != prev {
                return Err(format!(
                    "directory {recno} points back to {} instead of {prev}",
                    directory.prev
                ));
            }
            if recno <= prev_end {
                return Err(format!("directory {recno} overlaps records of directory {prev}"));
            }
            if directory.end_record() > record_count {
                return Err(format!(
                    "clusters of directory {recno} end at record {} past the file end {record_count}",
                    directory.end_record()
                ));
            }

            for kind in DataKind::ALL {
                let records = directory.records_of(kind);
                let per = kind.words_per_record() as u64;
                match directory.ranges[kind.index()] {
                    None if records == 0 => {}
                    Some((first, end))
                        if first == last[kind.index()] + 1
                            && (first - 1) % per == 0
                            && (end - 1) / per - (first - 1) / per + 1 == records =>
                    {
                        last[kind.index()] = end;
                    }
                    range => {
                        return Err(format!(
                            "directory {recno} {kind} range {range:?} does not match {records} records after address {}",
                            last[kind.index()]
                        ));
                    }
                }
            }

            prev = recno;
            prev_end = directory.end_record();
        }

        Ok(Self { directories, last })
    }

    /// Index after segregation: one directory holding one cluster per kind.
    pub(crate) fn segregated(first_directory: u64, last: [u64; 3]) -> Self {
        let mut directory = Directory::empty(first_directory, 0);
        for kind in DataKind::ALL {
            let words = last[kind.index()];
            if words > 0 {
                directory.ranges[kind.index()] = Some((1, words));
                directory.clusters.push(Cluster {
                    kind,
                    records: words.div_ceil(kind.words_per_record() as u64),
                });
            }
        }
        Self {
            directories: vec![directory],
            last,
        }
    }

    pub(crate) fn directories(&self) -> &[Directory] {
        &self.directories
    }

    pub(crate) const fn last_addresses(&self) -> [u64; 3] {
        self.last
    }

    pub(crate) const fn last_address(&self, kind: DataKind) -> u64 {
        self.last[kind.index()]
    }

    /// Last record used by the file.
    pub(crate) fn end_record(&self) -> u64 {
        self.directories
            .last()
            .map_or(0, Directory::end_record)
    }

    /// Physical extents of `kind` in logical order.
    pub(crate) fn extents(&self, kind: DataKind) -> Vec<Extent> {
        let mut extents = Vec::new();
        let mut first_index = 0;
        for directory in &self.directories {
            let mut recno = directory.recno + 1;
            for cluster in &directory.clusters {
                if cluster.kind == kind {
                    extents.push(Extent {
                        first_index,
                        recno,
                        records: cluster.records,
                    });
                    first_index += cluster.records;
                }
                recno += cluster.records;
            }
        }
        extents
    }

    /// Physical record holding the 0-based record `index` of `kind`.
    pub(crate) fn record_of(&self, kind: DataKind, index: u64) -> Option<u64> {
        self.extents(kind)
            .into_iter()
            .find(|e| index >= e.first_index && index < e.first_index + e.records)
            .map(|e| e.recno + index - e.first_index)
    }

    /// Physical record holding the last word of `kind`, 0 when empty.
    pub(crate) fn last_record(&self, kind: DataKind) -> u64 {
        match self.last[kind.index()] {
            0 => 0,
            last => {
                let per = kind.words_per_record() as u64;
                self.record_of(kind, (last - 1) / per).unwrap_or(0)
            }
        }
    }

    /// Reserve room for `words` more words of `kind`.
    ///
    /// The partially used last record of the kind is topped up first. The
    /// rest goes into new records at the end of the file, extending the
    /// last cluster when it has the same kind, otherwise in a new cluster,
    /// in a new directory once the current one has no free slot.
    pub(crate) fn grow(&mut self, kind: DataKind, words: u64) -> Result<Growth, Invalid> {
        let k = kind.index();
        let per = kind.words_per_record() as u64;
        let mut growth = Growth::default();
        let mut remaining = words;

        let used = self.last[k] % per;
        if used != 0 && remaining > 0 {
            let last = self.last[k];
            let count = (per - used).min(remaining);
            let recno = self
                .record_of(kind, last / per)
                .ok_or_else(|| format!("no record holds {kind} address {last}"))?;
            let position = self
                .directories
                .iter()
                .rposition(|d| d.ranges[k].is_some_and(|(_, end)| end == last))
                .ok_or_else(|| format!("no directory covers {kind} address {last}"))?;

            if let Some((_, end)) = self.directories[position].ranges[k].as_mut() {
                *end += count;
            }
            growth.fill = Some((recno, used, count));
            growth.dirty.push(position);
            self.last[k] += count;
            remaining -= count;
        }

        if remaining > 0 {
            let records = remaining.div_ceil(per);
            let mut position = self.directories.len() - 1;
            let directory = &mut self.directories[position];
            let end = directory.end_record();

            let recno = if let Some(cluster) = directory.clusters.last_mut()
                && cluster.kind == kind
            {
                cluster.records += records;
                end + 1
            } else if directory.clusters.len() < DIRECTORY_CLUSTERS {
                directory.clusters.push(Cluster { kind, records });
                end + 1
            } else {
                directory.next = end + 1;
                let mut added = Directory::empty(end + 1, directory.recno);
                added.clusters.push(Cluster { kind, records });
                self.directories.push(added);
                growth.dirty.push(position);
                position += 1;
                end + 2
            };

            let start = self.last[k] + 1;
            self.last[k] += remaining;
            let range = &mut self.directories[position].ranges[k];
            *range = Some((range.map_or(start, |(first, _)| first), self.last[k]));

            growth.run = Some((recno, records));
            growth.dirty.push(position);
        }

        growth.dirty.sort_unstable();
        growth.dirty.dedup();
        Ok(growth)
    }

    /// Move every directory and cluster `delta` records further into the
    /// file.
    pub(crate) fn shift(&mut self, delta: u64) {
        for directory in &mut self.directories {
            directory.recno += delta;
            if directory.prev != 0 {
                directory.prev += delta;
            }
            if directory.next != 0 {
                directory.next += delta;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cluster_signs_follow_kind_cycle() {
        let mut directory = Directory::empty(3, 0);
        directory.clusters = vec![
            Cluster { kind: DataKind::Int, records: 2 },
            Cluster { kind: DataKind::Char, records: 1 },
            Cluster { kind: DataKind::Int, records: 4 },
            Cluster { kind: DataKind::Double, records: 5 },
        ];
        let words = directory.encode();
        assert_eq!(words[FIRST_KIND], 3);
        assert_eq!(&words[CLUSTER_START..CLUSTER_START + 5], &[2, 1, -4, -5, 0]);

        let decoded = Directory::decode(3, &words).expect("decode");
        assert_eq!(decoded, directory);
    }

    #[test]
    fn test_decode_rejects_bad_kind_code() {
        let mut words = [0; INTS_PER_RECORD];
        words[FIRST_KIND] = 7;
        words[CLUSTER_START] = 1;
        assert!(Directory::decode(2, &words).is_err());
    }

    #[test]
    fn test_grow_fills_then_extends() {
        let mut index = DirectoryIndex::new(2);

        let growth = index.grow(DataKind::Int, 300).expect("grow");
        assert_eq!(growth.fill, None);
        assert_eq!(growth.run, Some((3, 2)));
        assert_eq!(index.last_address(DataKind::Int), 300);

        let growth = index.grow(DataKind::Char, 10).expect("grow");
        assert_eq!(growth.run, Some((5, 1)));

        // Ints top up record 4 before starting a new cluster at record 6.
        let growth = index.grow(DataKind::Int, 300).expect("grow");
        assert_eq!(growth.fill, Some((4, 44, 212)));
        assert_eq!(growth.run, Some((6, 1)));
        assert_eq!(index.last_address(DataKind::Int), 600);
        assert_eq!(index.directories()[0].ranges[DataKind::Int.index()], Some((1, 600)));
        assert_eq!(index.record_of(DataKind::Int, 2), Some(6));
        assert_eq!(index.last_record(DataKind::Char), 5);
        assert_eq!(index.end_record(), 6);
    }

    #[test]
    fn test_grow_opens_new_directory_when_slots_run_out() {
        let mut index = DirectoryIndex::new(2);
        let kinds = [DataKind::Char, DataKind::Double];
        for i in 0..DIRECTORY_CLUSTERS {
            let kind = kinds[i % 2];
            index
                .grow(kind, kind.words_per_record() as u64)
                .expect("grow");
        }
        assert_eq!(index.directories().len(), 1);
        let end = index.end_record();

        let growth = index.grow(DataKind::Int, 1).expect("grow");
        assert_eq!(growth.run, Some((end + 2, 1)));
        assert_eq!(growth.dirty, vec![0, 1]);

        let directories = index.directories();
        assert_eq!(directories[0].next, end + 1);
        assert_eq!(directories[1].prev, 2);
        assert_eq!(directories[1].ranges[DataKind::Int.index()], Some((1, 1)));
    }

    #[test]
    fn test_validation_round_trip() {
        let mut index = DirectoryIndex::new(4);
        index.grow(DataKind::Double, 200).expect("grow");
        index.grow(DataKind::Char, 5000).expect("grow");
        index.grow(DataKind::Double, 100).expect("grow");

        let decoded: Vec<Directory> = index
            .directories()
            .iter()
            .map(|d| Directory::decode(d.recno, &d.encode()).expect("decode"))
            .collect();
        let rebuilt =
            DirectoryIndex::from_directories(decoded, index.end_record()).expect("valid");
        assert_eq!(rebuilt, index);
        assert_eq!(rebuilt.last_addresses(), [5000, 300, 0]);
    }

    #[test]
    fn test_validation_rejects_truncated_file() {
        let mut index = DirectoryIndex::new(2);
        index.grow(DataKind::Double, 1000).expect("grow");
        let directories = index.directories().to_vec();
        let err = DirectoryIndex::from_directories(directories, index.end_record() - 1)
            .expect_err("truncated");
        assert!(err.contains("past the file end"));
    }

    #[test]
    fn test_validation_rejects_inconsistent_range() {
        let mut index = DirectoryIndex::new(2);
        index.grow(DataKind::Int, 10).expect("grow");
        let mut directories = index.directories().to_vec();
        directories[0].ranges[DataKind::Int.index()] = Some((1, 600));
        assert!(DirectoryIndex::from_directories(directories, 10).is_err());
    }

    #[test]
    fn test_segregated_layout() {
        let index = DirectoryIndex::segregated(3, [2000, 0, 300]);
        let directory = &index.directories()[0];
        assert_eq!(
            directory.clusters,
            vec![
                Cluster { kind: DataKind::Char, records: 2 },
                Cluster { kind: DataKind::Int, records: 2 },
            ]
        );
        assert_eq!(index.end_record(), 7);
        assert_eq!(index.record_of(DataKind::Int, 1), Some(7));
    }

    #[test]
    fn test_shift_moves_pointers() {
        let mut index = DirectoryIndex::new(2);
        for _ in 0..DIRECTORY_CLUSTERS {
            index.grow(DataKind::Char, 1024).expect("grow");
            index.grow(DataKind::Int, 256).expect("grow");
        }
        let before = index.directories().to_vec();
        index.shift(3);
        for (old, new) in before.iter().zip(index.directories()) {
            assert_eq!(new.recno, old.recno + 3);
            assert_eq!(new.next, if old.next == 0 { 0 } else { old.next + 3 });
            assert_eq!(new.prev, if old.prev == 0 { 0 } else { old.prev + 3 });
        }
    }
}
