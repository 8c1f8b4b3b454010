//! Advisory exclusive lock over an async journal directory: opening the
//! same journal from a second process is undefined, so we refuse to try.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::errors::SiloError;

const LOCK_FILE: &str = "LOCK";

/// RAII exclusive lock on a journal directory. Released on drop.
pub struct JournalLock {
    file: File,
    path: PathBuf,
}

impl JournalLock {
    pub fn acquire(dir: &Path) -> Result<Self, SiloError> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(SiloError::backend)?;

        file.try_lock_exclusive().map_err(|_| {
            let holder = std::fs::read_to_string(&path).unwrap_or_default();
            SiloError::Wrapper(format!(
                "journal at {} is already locked by pid {}",
                dir.display(),
                holder.trim()
            ))
        })?;

        let mut locked = file;
        writeln!(locked, "{}", std::process::id()).map_err(SiloError::backend)?;
        locked.sync_all().map_err(SiloError::backend)?;

        Ok(Self { file: locked, path })
    }
}

impl Drop for JournalLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_second_lock_on_the_same_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let first = JournalLock::acquire(dir.path()).unwrap();
        assert!(JournalLock::acquire(dir.path()).is_err());
        drop(first);
        assert!(JournalLock::acquire(dir.path()).is_ok());
    }
}
