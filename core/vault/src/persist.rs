//! Atomic replacement of files on disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::interrupt;
use treevault_common::Result;

/// Replace the contents of `path` with `bytes`.
///
/// The data goes to a temporary file in the same directory, is flushed to
/// disk, and is then renamed over `path`. Readers see either the old content
/// or the new one, never a partial file. The new file is owner read/write
/// only. An interrupt arriving meanwhile is left pending for the caller.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    stage(path, bytes)?.commit()
}

/// Contents written and synced next to their destination, not yet in place.
///
/// Dropping a `Staged` without committing removes the temporary file and
/// leaves the destination untouched.
pub struct Staged {
    file: NamedTempFile,
    target: PathBuf,
}

/// Prepare replacing `path` with `bytes`, without touching `path` yet.
pub fn stage(path: &Path, bytes: &[u8]) -> Result<Staged> {
    let _deferral = interrupt::defer();

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::Builder::new()
        .prefix(".treevault-")
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    debug!("Staged {} bytes for {}", bytes.len(), path.display());

    Ok(Staged {
        file,
        target: path.to_path_buf(),
    })
}

impl Staged {
    /// Where the contents will land.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the staged file over its destination.
    pub fn commit(self) -> Result<()> {
        let _deferral = interrupt::defer();
        self.file.persist(&self.target).map_err(|e| e.error)?;
        debug!("Replaced {}", self.target.display());
        Ok(())
    }
}
