//! DAF file record (record 1).
//!
//! Layout (1024 bytes total, integers in the file's binary format):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x000  | 8    | ID word (`DAF/SPK `) |
//! | 0x008  | 4    | ND, doubles per summary |
//! | 0x00C  | 4    | NI, integers per summary |
//! | 0x010  | 60   | Internal file name |
//! | 0x04C  | 4    | FWARD, first summary record |
//! | 0x050  | 4    | BWARD, last summary record |
//! | 0x054  | 4    | FREE, first free word address |
//! | 0x058  | 8    | Binary format label |
//! | 0x060  | 603  | Zero fill |
//! | 0x2BB  | 28   | FTP validation string |
//! | 0x2D7  | 297  | Zero fill |
//!
//! The fill areas are carried through unchanged when a record is rewritten.

use crate::ftp::FTP_VALIDATION;
use crate::summary::SummaryLayout;
use crate::{
    BinaryFormat, FormatError, INTERNAL_NAME_LEN, IdWord, RECORD_BYTES, Record, Result,
};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

/// Byte offset of the binary format label.
pub const DAF_FORMAT_OFFSET: usize = 88;

/// DAF file record.
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
pub struct DafFileRecord {
    /// Raw ID word field.
    pub id_word: [u8; 8],
    /// Doubles per array summary.
    pub nd: i32,
    /// Integers per array summary.
    pub ni: i32,
    /// Raw internal file name field.
    pub internal_name: [u8; INTERNAL_NAME_LEN],
    /// First summary record.
    pub fward: i32,
    /// Last summary record.
    pub bward: i32,
    /// First free word address.
    pub free: i32,
    /// Raw binary format label.
    pub format_label: [u8; 8],
    reserved_a: [u8; 603],
    ftp: [u8; 28],
    reserved_b: [u8; 297],
}

impl DafFileRecord {
    /// Create a file record for a new file.
    ///
    /// Directory pointers start at zero; the caller fills them in once the
    /// initial records are laid out.
    pub fn new(
        id_word: &IdWord,
        layout: SummaryLayout,
        internal_name: &str,
        format: BinaryFormat,
    ) -> Self {
        Self {
            id_word: id_word.to_bytes(),
            nd: layout.nd() as i32,
            ni: layout.ni() as i32,
            internal_name: crate::padded_field(internal_name),
            fward: 0,
            bward: 0,
            free: 0,
            format_label: format.label_bytes(),
            reserved_a: [0; 603],
            ftp: FTP_VALIDATION,
            reserved_b: [0; 297],
        }
    }

    /// Determine the binary format of a raw DAF file record.
    ///
    /// Files written before the format label existed leave it blank; for
    /// those the byte order that yields a valid ND/NI pair wins.
    pub fn detect_format(record: &[u8]) -> Result<BinaryFormat> {
        if record.len() < RECORD_BYTES {
            return Err(FormatError::LengthMismatch {
                what: "DAF file record",
                expected: RECORD_BYTES,
                actual: record.len(),
            });
        }

        let label = &record[DAF_FORMAT_OFFSET..DAF_FORMAT_OFFSET + 8];
        if !label.iter().all(|b| *b == b' ' || *b == 0) {
            return BinaryFormat::from_label(label);
        }

        let plausible = |format: BinaryFormat| {
            let nd = format.decode_i32([record[8], record[9], record[10], record[11]]);
            let ni = format.decode_i32([record[12], record[13], record[14], record[15]]);
            usize::try_from(nd)
                .ok()
                .zip(usize::try_from(ni).ok())
                .is_some_and(|(nd, ni)| SummaryLayout::new(nd, ni).is_ok())
        };

        let native = BinaryFormat::native();
        let swapped = match native {
            BinaryFormat::BigIeee => BinaryFormat::LtlIeee,
            _ => BinaryFormat::BigIeee,
        };

        if plausible(native) {
            Ok(native)
        } else if plausible(swapped) {
            Ok(swapped)
        } else {
            Err(FormatError::UndeterminedFormat(
                "blank format label and no byte order yields a valid ND/NI".to_string(),
            ))
        }
    }

    /// Parse a raw record whose format is already known.
    pub fn parse(record: &[u8], format: BinaryFormat) -> Result<Self> {
        let mut cursor = Cursor::new(record);
        Ok(Self::read_options(&mut cursor, format.int_endian(), ())?)
    }

    /// Serialize to a full record.
    pub fn to_bytes(&self, format: BinaryFormat) -> Result<Record> {
        let mut record = [0u8; RECORD_BYTES];
        let mut cursor = Cursor::new(&mut record[..]);
        self.write_options(&mut cursor, format.int_endian(), ())?;
        Ok(record)
    }

    /// Parsed ID word.
    pub fn id(&self) -> Result<IdWord> {
        IdWord::parse(&self.id_word)
    }

    /// Internal file name without trailing blanks.
    pub fn internal_name(&self) -> String {
        crate::trimmed_field(&self.internal_name)
    }

    /// Replace the internal file name.
    pub fn set_internal_name(&mut self, name: &str) {
        self.internal_name = crate::padded_field(name);
    }

    /// Summary layout declared by ND and NI.
    pub fn layout(&self) -> Result<SummaryLayout> {
        let nd = usize::try_from(self.nd).map_err(|_| FormatError::InvalidLayout {
            nd: 0,
            ni: 0,
            reason: "negative ND",
        })?;
        let ni = usize::try_from(self.ni).map_err(|_| FormatError::InvalidLayout {
            nd,
            ni: 0,
            reason: "negative NI",
        })?;
        SummaryLayout::new(nd, ni)
    }
}
