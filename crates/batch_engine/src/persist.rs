use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::NamedTempFile;

use crate::error::PersistError;
use crate::filename::collision_candidates;

/// Upper bound on collision candidates tried for one filename.
const MAX_NAME_CANDIDATES: usize = 1_000;

/// Ensure the directory exists (creating it if missing) and that a marker file
/// can be created and removed inside it.
pub fn probe_writable_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.as_os_str().is_empty() {
        return Err(PersistError::Directory("empty path".into()));
    }
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::Directory(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::Directory("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::Directory(e.to_string()))?;
    }
    // The marker is removed when dropped.
    let marker = tempfile::Builder::new()
        .prefix(".batch_write_test")
        .tempfile_in(dir)
        .map_err(|e| PersistError::Directory(e.to_string()))?;
    drop(marker);
    Ok(())
}

/// Writes files into one directory through a temp file and a rename.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// A temp file inside the target directory to stream content into.
    pub fn staging_file(&self) -> Result<NamedTempFile, PersistError> {
        Ok(NamedTempFile::new_in(&self.dir)?)
    }

    /// Write `content` to `{dir}/{filename}`, replacing any existing file.
    pub fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        probe_writable_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = self.staging_file()?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }

    /// Move a finished staging file to the first free name among `filename`'s
    /// collision candidates. Existing files are never replaced.
    pub fn persist_new(
        &self,
        mut staged: NamedTempFile,
        filename: &str,
    ) -> Result<PathBuf, PersistError> {
        staged.flush()?;
        for candidate in collision_candidates(filename, Local::now()).take(MAX_NAME_CANDIDATES) {
            let target = self.dir.join(&candidate);
            match staged.persist_noclobber(&target) {
                Ok(_) => return Ok(target),
                Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                    staged = err.file;
                }
                Err(err) => return Err(PersistError::Io(err.error)),
            }
        }
        Err(PersistError::NameExhausted(
            filename.to_string(),
            MAX_NAME_CANDIDATES,
        ))
    }
}
