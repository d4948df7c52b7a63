//! FTP validation string.
//!
//! New files carry a fixed byte sequence in their file record made of the
//! characters an ASCII-mode transfer rewrites: CR, LF, CR-LF, a NUL after a
//! CR, and two bytes with the high bit set. If any of them was altered the
//! binary content is damaged too and the file must be rejected.

use crate::{FormatError, Result};

/// The validation sequence written to new file records.
pub const FTP_VALIDATION: [u8; 28] = *b"FTPSTR:\r:\n:\r\n:\r\x00:\x81:\x10\xce:ENDFTP";

const FTP_START: &[u8] = b"FTPSTR:";
const FTP_END: &[u8] = b":ENDFTP";

/// Check a file record for transfer damage.
///
/// Records without the `FTPSTR:` marker predate the validation string and
/// are accepted.
pub fn check_record(record: &[u8]) -> Result<()> {
    let Some(start) = find(record, FTP_START) else {
        return Ok(());
    };

    let tail = &record[start..];
    let Some(end) = find(tail, FTP_END) else {
        return Err(FormatError::FtpCorruption);
    };

    if &tail[..end + FTP_END.len()] == FTP_VALIDATION.as_slice() {
        Ok(())
    } else {
        Err(FormatError::FtpCorruption)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
