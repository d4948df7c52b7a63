//! DAS file record (record 1).
//!
//! Layout (1024 bytes total, integers in the file's binary format):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x000  | 8    | ID word (`DAS/EK  `) |
//! | 0x008  | 60   | Internal file name |
//! | 0x044  | 4    | NRESVR, reserved record count |
//! | 0x048  | 4    | NRESVC, reserved characters in use |
//! | 0x04C  | 4    | NCOMR, comment record count |
//! | 0x050  | 4    | NCOMC, comment characters in use |
//! | 0x054  | 8    | Binary format label |
//! | 0x05C  | 608  | Zero fill |
//! | 0x2BC  | 28   | FTP validation string |
//! | 0x2D8  | 296  | Zero fill |

use crate::ftp::FTP_VALIDATION;
use crate::{BinaryFormat, FormatError, INTERNAL_NAME_LEN, IdWord, RECORD_BYTES, Record, Result};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

/// Byte offset of the binary format label.
pub const DAS_FORMAT_OFFSET: usize = 84;

/// DAS file record.
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
pub struct DasFileRecord {
    /// Raw ID word field.
    pub id_word: [u8; 8],
    /// Raw internal file name field.
    pub internal_name: [u8; INTERNAL_NAME_LEN],
    /// Reserved records.
    pub nresvr: i32,
    /// Reserved characters in use.
    pub nresvc: i32,
    /// Comment records.
    pub ncomr: i32,
    /// Comment characters in use.
    pub ncomc: i32,
    /// Raw binary format label.
    pub format_label: [u8; 8],
    reserved_a: [u8; 608],
    ftp: [u8; 28],
    reserved_b: [u8; 296],
}

impl DasFileRecord {
    /// Create a file record for a new file with no reserved or comment records.
    pub fn new(id_word: &IdWord, internal_name: &str, format: BinaryFormat) -> Self {
        Self {
            id_word: id_word.to_bytes(),
            internal_name: crate::padded_field(internal_name),
            nresvr: 0,
            nresvc: 0,
            ncomr: 0,
            ncomc: 0,
            format_label: format.label_bytes(),
            reserved_a: [0; 608],
            ftp: FTP_VALIDATION,
            reserved_b: [0; 296],
        }
    }

    /// Determine the binary format of a raw DAS file record.
    ///
    /// A blank label predates format labelling and means the host format.
    pub fn detect_format(record: &[u8]) -> Result<BinaryFormat> {
        if record.len() < RECORD_BYTES {
            return Err(FormatError::LengthMismatch {
                what: "DAS file record",
                expected: RECORD_BYTES,
                actual: record.len(),
            });
        }

        let label = &record[DAS_FORMAT_OFFSET..DAS_FORMAT_OFFSET + 8];
        if label.iter().all(|b| *b == b' ' || *b == 0) {
            Ok(BinaryFormat::native())
        } else {
            BinaryFormat::from_label(label)
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
}
