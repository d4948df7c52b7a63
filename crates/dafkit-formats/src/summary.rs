//! DAF array summaries and summary records.
//!
//! An array summary holds `ND` doubles followed by `NI` integers. Integers
//! are packed two to a double word in host byte layout, integer `2k` in the
//! low-address half, so a summary occupies `SS = ND + (NI + 1) / 2` double
//! words. The last two integers are always the begin and end word addresses
//! of the array.
//!
//! A summary record is 128 double words:
//!
//! | Word | Content |
//! |------|---------|
//! | 0    | NEXT, record number of the next summary record (0 at the end) |
//! | 1    | PREV, record number of the previous summary record (0 at the start) |
//! | 2    | NSUM, number of summaries in this record |
//! | 3..  | NSUM summaries of SS words each |
//!
//! The name record that follows every summary record holds one `8 * SS`
//! character name per summary, blank padded.

use crate::{BinaryFormat, DOUBLES_PER_RECORD, FormatError, RECORD_BYTES, Record, Result};

/// Control words at the start of every summary record.
pub const CONTROL_WORDS: usize = 3;

/// Largest ND accepted.
pub const MAX_ND: usize = 124;

/// Smallest NI accepted; the two address integers are mandatory.
pub const MIN_NI: usize = 2;

/// Largest NI accepted.
pub const MAX_NI: usize = 250;

/// Largest summary size in double words.
pub const MAX_SUMMARY_SIZE: usize = DOUBLES_PER_RECORD - CONTROL_WORDS;

/// Shape of the summaries in one DAF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SummaryLayout {
    nd: usize,
    ni: usize,
}

impl SummaryLayout {
    /// Validate an ND/NI pair.
    pub fn new(nd: usize, ni: usize) -> Result<Self> {
        let reason = if nd > MAX_ND {
            Some("ND exceeds 124")
        } else if ni < MIN_NI {
            Some("NI must be at least 2")
        } else if ni > MAX_NI {
            Some("NI exceeds 250")
        } else if nd + ni.div_ceil(2) > MAX_SUMMARY_SIZE {
            Some("summary does not fit in a record")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(FormatError::InvalidLayout { nd, ni, reason }),
            None => Ok(Self { nd, ni }),
        }
    }

    /// Number of double components.
    pub const fn nd(self) -> usize {
        self.nd
    }

    /// Number of integer components.
    pub const fn ni(self) -> usize {
        self.ni
    }

    /// Summary size in double words.
    pub const fn size(self) -> usize {
        self.nd + self.ni.div_ceil(2)
    }

    /// Length of an array name in characters.
    pub const fn name_len(self) -> usize {
        8 * self.size()
    }

    /// Maximum summaries per summary record.
    pub const fn per_record(self) -> usize {
        MAX_SUMMARY_SIZE / self.size()
    }

    /// Pack double and integer components into a summary.
    pub fn pack(self, doubles: &[f64], ints: &[i32]) -> Result<Vec<f64>> {
        check_len("summary doubles", self.nd, doubles.len())?;
        check_len("summary integers", self.ni, ints.len())?;

        let mut summary = Vec::with_capacity(self.size());
        summary.extend_from_slice(doubles);
        for pair in ints.chunks(2) {
            let low = pair[0];
            let high = pair.get(1).copied().unwrap_or(0);
            summary.push(pack_pair(low, high));
        }
        Ok(summary)
    }

    /// Split a summary into its double and integer components.
    pub fn unpack(self, summary: &[f64]) -> Result<(Vec<f64>, Vec<i32>)> {
        check_len("summary", self.size(), summary.len())?;

        let doubles = summary[..self.nd].to_vec();
        let mut ints = Vec::with_capacity(self.ni + 1);
        for word in &summary[self.nd..] {
            let (low, high) = unpack_pair(*word);
            ints.push(low);
            ints.push(high);
        }
        ints.truncate(self.ni);
        Ok((doubles, ints))
    }

    /// Begin and end word addresses stored in the last two integers.
    pub fn addresses(self, summary: &[f64]) -> Result<(i32, i32)> {
        let (_, ints) = self.unpack(summary)?;
        Ok((ints[self.ni - 2], ints[self.ni - 1]))
    }

    /// Copy of `summary` with its begin and end addresses replaced.
    pub fn with_addresses(self, summary: &[f64], begin: i32, end: i32) -> Result<Vec<f64>> {
        let (doubles, mut ints) = self.unpack(summary)?;
        ints[self.ni - 2] = begin;
        ints[self.ni - 1] = end;
        self.pack(&doubles, &ints)
    }

    /// Decode a summary record stored in `format`.
    ///
    /// Summaries come back in host layout whatever the file format: double
    /// slots are translated as doubles, integer halves as integers.
    pub fn decode_record(self, format: BinaryFormat, record: &Record) -> Result<SummaryRecord> {
        let word = |index: usize| {
            let start = index * 8;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&record[start..start + 8]);
            format.decode_f64(bytes)
        };

        let next = control_word("NEXT", word(0))?;
        let prev = control_word("PREV", word(1))?;
        let nsum = control_word("NSUM", word(2))?;
        if nsum > self.per_record() {
            return Err(FormatError::InvalidControlWord {
                name: "NSUM",
                value: word(2),
            });
        }

        let ss = self.size();
        let mut summaries = Vec::with_capacity(nsum);
        let mut doubles = vec![0.0; self.nd];
        let mut ints = vec![0; self.ni];
        for i in 0..nsum {
            let start = (CONTROL_WORDS + i * ss) * 8;
            let int_start = start + self.nd * 8;
            format.decode_f64_slice(&record[start..int_start], &mut doubles);
            format.decode_i32_slice(&record[int_start..int_start + self.ni * 4], &mut ints);
            summaries.push(self.pack(&doubles, &ints)?);
        }

        Ok(SummaryRecord {
            next,
            prev,
            summaries,
        })
    }

    /// Encode a summary record for a file stored in `format`.
    pub fn encode_record(self, format: BinaryFormat, summary_record: &SummaryRecord) -> Result<Record> {
        let nsum = summary_record.summaries.len();
        if nsum > self.per_record() {
            return Err(FormatError::LengthMismatch {
                what: "summaries per record",
                expected: self.per_record(),
                actual: nsum,
            });
        }

        let mut record = [0u8; RECORD_BYTES];
        let control = [
            summary_record.next as f64,
            summary_record.prev as f64,
            nsum as f64,
        ];
        format.encode_f64_slice(&control, &mut record[..CONTROL_WORDS * 8])?;

        let ss = self.size();
        for (i, summary) in summary_record.summaries.iter().enumerate() {
            let (doubles, ints) = self.unpack(summary)?;
            let start = (CONTROL_WORDS + i * ss) * 8;
            let int_start = start + self.nd * 8;
            format.encode_f64_slice(&doubles, &mut record[start..int_start])?;
            format.encode_i32_slice(&ints, &mut record[int_start..int_start + self.ni * 4]);
        }

        Ok(record)
    }

    /// Decode the first `count` names of a name record.
    pub fn decode_names(self, record: &Record, count: usize) -> Vec<String> {
        record
            .chunks_exact(self.name_len())
            .take(count)
            .map(crate::trimmed_field)
            .collect()
    }

    /// Encode names into a blank filled name record.
    pub fn encode_names<S: AsRef<str>>(self, names: &[S]) -> Record {
        let mut record = [b' '; RECORD_BYTES];
        for (slot, name) in record.chunks_exact_mut(self.name_len()).zip(names) {
            self.write_name(slot, name.as_ref());
        }
        record
    }

    /// Blank pad or truncate a name to the layout's name length.
    pub fn name_field(self, name: &str) -> Vec<u8> {
        let mut field = vec![b' '; self.name_len()];
        self.write_name(&mut field, name);
        field
    }

    fn write_name(self, slot: &mut [u8], name: &str) {
        slot.fill(b' ');
        for (dst, src) in slot.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
    }
}

/// One decoded summary record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SummaryRecord {
    /// Next summary record, 0 if this is the last.
    pub next: usize,
    /// Previous summary record, 0 if this is the first.
    pub prev: usize,
    /// Packed summaries in host layout.
    pub summaries: Vec<Vec<f64>>,
}

impl SummaryRecord {
    /// Empty record with the given links.
    pub const fn new(next: usize, prev: usize) -> Self {
        Self {
            next,
            prev,
            summaries: Vec::new(),
        }
    }

    /// Number of summaries held.
    pub fn nsum(&self) -> usize {
        self.summaries.len()
    }
}

fn pack_pair(low: i32, high: i32) -> f64 {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&low.to_ne_bytes());
    bytes[4..].copy_from_slice(&high.to_ne_bytes());
    f64::from_ne_bytes(bytes)
}

fn unpack_pair(word: f64) -> (i32, i32) {
    let bytes = word.to_ne_bytes();
    let low = i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let high = i32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    (low, high)
}

fn control_word(name: &'static str, value: f64) -> Result<usize> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(i32::MAX) {
        Ok(value as usize)
    } else {
        Err(FormatError::InvalidControlWord { name, value })
    }
}

const fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(FormatError::LengthMismatch {
            what,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_layout_sizes() {
        let spk = SummaryLayout::new(2, 6).expect("layout");
        assert_eq!(spk.size(), 5);
        assert_eq!(spk.name_len(), 40);
        assert_eq!(spk.per_record(), 25);

        let ck = SummaryLayout::new(2, 5).expect("layout");
        assert_eq!(ck.size(), 5);

        let odd = SummaryLayout::new(0, 3).expect("layout");
        assert_eq!(odd.size(), 2);
        assert_eq!(odd.per_record(), 62);
    }

    #[test]
    fn test_layout_limits() {
        assert!(SummaryLayout::new(124, 2).is_ok());
        assert!(SummaryLayout::new(125, 2).is_err());
        assert!(SummaryLayout::new(2, 1).is_err());
        assert!(SummaryLayout::new(0, 250).is_ok());
        assert!(SummaryLayout::new(0, 251).is_err());
        assert!(SummaryLayout::new(1, 250).is_err());
    }

    #[test]
    fn test_pack_places_ints_in_halves() {
        let layout = SummaryLayout::new(1, 3).expect("layout");
        let packed = layout.pack(&[1.5], &[7, 8, 9]).expect("pack");
        assert_eq!(packed.len(), 3);
        assert_eq!(packed[0], 1.5);

        let bytes = packed[1].to_ne_bytes();
        assert_eq!(&bytes[..4], &7i32.to_ne_bytes());
        assert_eq!(&bytes[4..], &8i32.to_ne_bytes());
        let bytes = packed[2].to_ne_bytes();
        assert_eq!(&bytes[..4], &9i32.to_ne_bytes());
        assert_eq!(&bytes[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_pack_rejects_wrong_counts() {
        let layout = SummaryLayout::new(2, 6).expect("layout");
        assert!(layout.pack(&[1.0], &[1, 2, 3, 4, 5, 6]).is_err());
        assert!(layout.pack(&[1.0, 2.0], &[1, 2]).is_err());
        assert!(layout.unpack(&[0.0; 4]).is_err());
    }

    #[test]
    fn test_addresses() {
        let layout = SummaryLayout::new(2, 6).expect("layout");
        let summary = layout
            .pack(&[0.0, 1.0], &[399, 10, 1, 2, 1025, 2048])
            .expect("pack");
        assert_eq!(layout.addresses(&summary).expect("addresses"), (1025, 2048));

        let moved = layout.with_addresses(&summary, 2049, 3072).expect("move");
        let (_, ints) = layout.unpack(&moved).expect("unpack");
        assert_eq!(ints, vec![399, 10, 1, 2, 2049, 3072]);
    }

    #[test]
    fn test_record_round_trip_in_every_ieee_format() {
        let layout = SummaryLayout::new(2, 6).expect("layout");
        let mut summary_record = SummaryRecord::new(7, 2);
        for i in 0..3 {
            summary_record.summaries.push(
                layout
                    .pack(&[f64::from(i), -1.0e9], &[i, -i, 3, 4, 1025 + i, 2048 + i])
                    .expect("pack"),
            );
        }

        for format in [BinaryFormat::BigIeee, BinaryFormat::LtlIeee] {
            let record = layout.encode_record(format, &summary_record).expect("encode");
            let decoded = layout.decode_record(format, &record).expect("decode");
            assert_eq!(decoded.next, 7);
            assert_eq!(decoded.prev, 2);
            assert_eq!(decoded.nsum(), 3);
            for (a, b) in decoded.summaries.iter().zip(&summary_record.summaries) {
                assert_eq!(layout.unpack(a).expect("a"), layout.unpack(b).expect("b"));
            }
        }
    }

    #[test]
    fn test_foreign_record_ints_are_word_order() {
        let layout = SummaryLayout::new(0, 2).expect("layout");
        let mut record = [0u8; RECORD_BYTES];
        record[16..24].copy_from_slice(&1.0f64.to_be_bytes());
        record[24..28].copy_from_slice(&5i32.to_be_bytes());
        record[28..32].copy_from_slice(&6i32.to_be_bytes());

        let decoded = layout
            .decode_record(BinaryFormat::BigIeee, &record)
            .expect("decode");
        let (_, ints) = layout.unpack(&decoded.summaries[0]).expect("unpack");
        assert_eq!(ints, vec![5, 6]);
    }

    #[test]
    fn test_bad_control_words() {
        let layout = SummaryLayout::new(2, 6).expect("layout");
        let fmt = BinaryFormat::native();

        let mut record = [0u8; RECORD_BYTES];
        fmt.encode_f64_slice(&[0.0, 0.0, 26.0], &mut record[..24])
            .expect("encode");
        assert!(matches!(
            layout.decode_record(fmt, &record),
            Err(FormatError::InvalidControlWord { name: "NSUM", .. })
        ));

        fmt.encode_f64_slice(&[-1.0, 0.0, 0.0], &mut record[..24])
            .expect("encode");
        assert!(layout.decode_record(fmt, &record).is_err());

        fmt.encode_f64_slice(&[0.5, 0.0, 0.0], &mut record[..24])
            .expect("encode");
        assert!(layout.decode_record(fmt, &record).is_err());
    }

    #[test]
    fn test_names() {
        let layout = SummaryLayout::new(2, 6).expect("layout");
        let record = layout.encode_names(&["EARTH", "MOON"]);
        assert_eq!(&record[..5], b"EARTH");
        assert_eq!(record[5], b' ');
        assert_eq!(&record[40..44], b"MOON");
        assert_eq!(layout.decode_names(&record, 2), vec!["EARTH", "MOON"]);

        let long = "X".repeat(50);
        assert_eq!(layout.name_field(&long).len(), 40);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        proptest! {
            #[test]
            fn pack_unpack_preserves_components(
                doubles in prop::collection::vec(-1.0e300f64..1.0e300, 0..8),
                ints in prop::collection::vec(any::<i32>(), 2..12),
            ) {
                let layout = SummaryLayout::new(doubles.len(), ints.len())
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                let packed = layout
                    .pack(&doubles, &ints)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(packed.len(), layout.size());

                let (d, i) = layout
                    .unpack(&packed)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(d, doubles);
                prop_assert_eq!(i, ints);
            }
        }
    }
}
