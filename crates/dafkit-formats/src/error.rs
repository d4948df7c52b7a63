//! Error types for record and format operations

use crate::BinaryFormat;
use thiserror::Error;

/// Format operation result type
pub type Result<T> = std::result::Result<T, FormatError>;

/// Errors raised while decoding or encoding records
#[derive(Debug, Error)]
pub enum FormatError {
    /// Binary format label not in the known table
    #[error("Unsupported binary format: {0:?}")]
    UnsupportedFormat(String),

    /// Blank format label and no byte order gives a plausible layout
    #[error("Cannot determine binary format: {0}")]
    UndeterminedFormat(String),

    /// ID word is neither a DAF nor a DAS identifier
    #[error("Unrecognized ID word: {0:?}")]
    UnrecognizedIdWord(String),

    /// FTP validation string damaged by a text-mode transfer
    #[error("FTP validation string is corrupt; file was probably transferred in text mode")]
    FtpCorruption,

    /// Value cannot be expressed in the target format
    #[error("Value {value:e} is not representable in {format}")]
    Unrepresentable {
        /// Target format
        format: BinaryFormat,
        /// Offending value
        value: f64,
    },

    /// ND/NI combination outside the supported range
    #[error("Invalid summary layout ND={nd} NI={ni}: {reason}")]
    InvalidLayout {
        /// Number of double components
        nd: usize,
        /// Number of integer components
        ni: usize,
        /// Why the layout was rejected
        reason: &'static str,
    },

    /// Slice length does not match the layout
    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// What was being checked
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Control word of a summary record is not a valid count or pointer
    #[error("Invalid summary record control word {name}: {value}")]
    InvalidControlWord {
        /// Control word name (NEXT, PREV, NSUM)
        name: &'static str,
        /// Decoded value
        value: f64,
    },

    /// Underlying binrw failure
    #[error("Binary layout error: {0}")]
    Binary(#[from] binrw::Error),
}
