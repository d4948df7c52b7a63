pub mod comments;
pub mod inspect;
pub mod optimize;

use anyhow::Context;
use dafkit_formats::{Architecture, IdWord, idword::ID_WORD_LEN};
use dafkit_storage::{Handle, HandleManager};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read the ID word at the start of `path` and report its architecture.
///
/// Only peeks at the first bytes to pick the DAF or DAS layer before the
/// managed open; the file is closed again right away.
pub fn architecture_of(path: &Path) -> anyhow::Result<Architecture> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut id_word = [0u8; ID_WORD_LEN];
    file.read_exact(&mut id_word)
        .with_context(|| format!("{} is too short for a file record", path.display()))?;
    let id = IdWord::parse(&id_word)
        .with_context(|| format!("{} is not a DAF or DAS file", path.display()))?;
    Ok(id.architecture())
}

/// Open `path` through the layer matching its ID word.
pub(crate) fn open(
    manager: &mut HandleManager,
    path: &Path,
    write: bool,
) -> anyhow::Result<(Handle, Architecture)> {
    let architecture = architecture_of(path)?;
    let handle = match (architecture, write) {
        (Architecture::Daf, false) => manager.daf().open_read(path)?,
        (Architecture::Daf, true) => manager.daf().open_write(path)?,
        (Architecture::Das, false) => manager.das().open_read(path)?,
        (Architecture::Das, true) => manager.das().open_write(path)?,
    };
    Ok((handle, architecture))
}
