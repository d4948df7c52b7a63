//! Record layouts and binary format translation for DAF and DAS files
//!
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::float_cmp)] // Bit-exact comparisons are the point of this crate
#![allow(clippy::derive_partial_eq_without_eq)] // Record structs with f64 neighbours
//! This crate holds the pure, I/O-free half of the direct-access file
//! subsystem: everything needed to turn a 1024-byte physical record into
//! typed values and back.
//!
//! # Contents
//!
//! - **Binary formats**: [`BinaryFormat`] translates 4-byte integers and
//!   8-byte doubles between a file's on-disk encoding (big/little endian
//!   IEEE, VAX D/G floating) and the host
//! - **ID words**: [`IdWord`] identifies the file architecture (`DAF/SPK`,
//!   `DAS/EK`, legacy `NAIF/DAF`)
//! - **FTP validation**: detects files damaged by text-mode transfers
//! - **File records**: [`DafFileRecord`] and [`DasFileRecord`], the first
//!   record of each architecture
//! - **Summaries**: [`SummaryLayout`] packs and unpacks DAF array summaries
//!   and encodes whole summary records
//!
//! # Example
//!
//! ```
//! use dafkit_formats::{BinaryFormat, SummaryLayout};
//!
//! let layout = SummaryLayout::new(2, 6).expect("valid layout");
//! let packed = layout
//!     .pack(&[0.0, 86400.0], &[399, 10, 1, 2, 1025, 2048])
//!     .expect("pack");
//! assert_eq!(packed.len(), 5);
//!
//! let (doubles, ints) = layout.unpack(&packed).expect("unpack");
//! assert_eq!(doubles, vec![0.0, 86400.0]);
//! assert_eq!(ints, vec![399, 10, 1, 2, 1025, 2048]);
//!
//! let bytes = BinaryFormat::BigIeee.encode_i32(1);
//! assert_eq!(bytes, [0, 0, 0, 1]);
//! ```

#![warn(missing_docs)]

pub mod binary;
pub mod daf_record;
pub mod das_record;
pub mod error;
pub mod ftp;
pub mod idword;
pub mod summary;

pub use binary::BinaryFormat;
pub use daf_record::DafFileRecord;
pub use das_record::DasFileRecord;
pub use error::{FormatError, Result};
pub use idword::{Architecture, IdWord};
pub use summary::{SummaryLayout, SummaryRecord};

/// Size of every physical record in bytes.
pub const RECORD_BYTES: usize = 1024;

/// Number of double precision words in a record.
pub const DOUBLES_PER_RECORD: usize = RECORD_BYTES / 8;

/// Number of integer words in a record.
pub const INTS_PER_RECORD: usize = RECORD_BYTES / 4;

/// Number of characters in a character record.
pub const CHARS_PER_RECORD: usize = RECORD_BYTES;

/// Length of the internal file name stored in file records.
pub const INTERNAL_NAME_LEN: usize = 60;

/// One raw physical record.
pub type Record = [u8; RECORD_BYTES];

/// Build a blank-padded fixed-width ASCII field.
///
/// Longer input is truncated. Used for ID words, internal file names and
/// array names, which are all blank padded on disk.
pub fn padded_field<const N: usize>(text: &str) -> [u8; N] {
    let mut field = [b' '; N];
    for (dst, src) in field.iter_mut().zip(text.bytes()) {
        *dst = src;
    }
    field
}

/// Read a fixed-width ASCII field, dropping trailing blanks and NULs.
pub fn trimmed_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches([' ', '\0'])
        .to_string()
}
