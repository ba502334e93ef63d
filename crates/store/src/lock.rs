//! Repository write lock
//!
//! Process coordination is done with an advisory exclusive lock on
//! `db/write-lock`, never with in-memory mutexes: multiple independent
//! processes may open the same store. The lock file is created once
//! and never truncated. Commit, revision property writes, and counter
//! bumps all run under this lock; readers take no lock at all.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use tessera_core::Result;

use crate::paths::RepoPaths;

/// RAII guard for the repository write lock
///
/// Acquiring blocks until the lock is free. The lock is released when
/// the guard drops, on success and error paths alike.
#[derive(Debug)]
pub struct WriteLock {
    file: File,
}

impl WriteLock {
    /// Block until the exclusive write lock is held
    pub fn acquire(paths: &RepoPaths) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(paths.write_lock_file())?;
        file.lock_exclusive()?;
        Ok(WriteLock { file })
    }

    /// Try to take the lock without blocking
    ///
    /// Returns `Ok(None)` if another holder currently has it.
    pub fn try_acquire(paths: &RepoPaths) -> Result<Option<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(paths.write_lock_file())?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(WriteLock { file })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_paths() -> (tempfile::TempDir, RepoPaths) {
        let dir = tempdir().unwrap();
        let paths = RepoPaths::from_root(dir.path().join("repo"));
        paths.create_directories().unwrap();
        (dir, paths)
    }

    #[test]
    fn test_acquire_and_release() {
        let (_dir, paths) = test_paths();

        let lock = WriteLock::acquire(&paths).unwrap();
        assert!(WriteLock::try_acquire(&paths).unwrap().is_none());

        drop(lock);
        assert!(WriteLock::try_acquire(&paths).unwrap().is_some());
    }

    #[test]
    fn test_lock_file_survives() {
        let (_dir, paths) = test_paths();

        drop(WriteLock::acquire(&paths).unwrap());
        assert!(paths.write_lock_file().exists());
    }
}
