//! File identification words.
//!
//! The first eight bytes of every DAF and DAS file name the architecture and
//! the kernel type layered on top of it, e.g. `DAF/SPK `, `DAF/CK  `,
//! `DAS/EK  `. Files written before kernel types existed carry `NAIF/DAF`
//! or `NAIF/DAS`.

use crate::{FormatError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the ID word field.
pub const ID_WORD_LEN: usize = 8;

/// Maximum length of the kernel type after the slash.
pub const MAX_FILE_TYPE_LEN: usize = 4;

/// File architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// Double precision Array File.
    Daf,
    /// Direct Access Segregated file.
    Das,
}

impl Architecture {
    /// Prefix used in ID words.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Daf => "DAF",
            Self::Das => "DAS",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Parsed ID word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdWord {
    architecture: Architecture,
    /// Kernel type (`SPK`, `CK`, `EK`...). Empty for legacy ID words.
    file_type: String,
}

impl IdWord {
    /// Build an ID word for a new file.
    pub fn new(architecture: Architecture, file_type: &str) -> Result<Self> {
        let valid = !file_type.is_empty()
            && file_type.len() <= MAX_FILE_TYPE_LEN
            && file_type.bytes().all(|b| b.is_ascii_graphic());
        if !valid {
            return Err(FormatError::UnrecognizedIdWord(format!(
                "{}/{file_type}",
                architecture.prefix()
            )));
        }

        Ok(Self {
            architecture,
            file_type: file_type.to_string(),
        })
    }

    /// Parse the ID word field of a file record.
    pub fn parse(field: &[u8]) -> Result<Self> {
        let text = crate::trimmed_field(&field[..field.len().min(ID_WORD_LEN)]);

        match text.as_str() {
            "NAIF/DAF" => {
                return Ok(Self {
                    architecture: Architecture::Daf,
                    file_type: String::new(),
                });
            }
            "NAIF/DAS" => {
                return Ok(Self {
                    architecture: Architecture::Das,
                    file_type: String::new(),
                });
            }
            _ => {}
        }

        let architecture = match text.split_once('/') {
            Some(("DAF", _)) => Architecture::Daf,
            Some(("DAS", _)) => Architecture::Das,
            _ => return Err(FormatError::UnrecognizedIdWord(text)),
        };

        let file_type = &text[4..];
        Self::new(architecture, file_type).map_err(|_| FormatError::UnrecognizedIdWord(text.clone()))
    }

    /// File architecture.
    pub const fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Kernel type, empty for legacy ID words.
    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    /// Blank padded 8-byte field.
    pub fn to_bytes(&self) -> [u8; ID_WORD_LEN] {
        crate::padded_field(&self.to_string())
    }
}

impl fmt::Display for IdWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file_type.is_empty() {
            write!(f, "NAIF/{}", self.architecture)
        } else {
            write!(f, "{}/{}", self.architecture, self.file_type)
        }
    }
}
