//! Working-copy administrative locks
//!
//! Drivers lock the administrative area of the anchor directory (and
//! the target directory, when the operand is itself a versioned
//! directory) before touching entries. The lock is a `lock` file
//! inside `.tsr/`, created exclusively; RAII guards guarantee release
//! on every exit path, error paths included.

use crate::entries;
use std::path::{Path, PathBuf};
use tessera_core::{Error, Result};

/// Lock on one directory's administrative area
#[derive(Debug)]
pub struct AdminLock {
    lock_file: PathBuf,
}

impl AdminLock {
    /// Lock `dir`'s administrative area
    ///
    /// # Errors
    /// - [`Error::EntryNotFound`] if `dir` is not versioned
    /// - [`Error::WorkingCopyLocked`] if another holder has the lock
    pub fn acquire(dir: &Path) -> Result<AdminLock> {
        if !entries::is_versioned(dir) {
            return Err(Error::EntryNotFound {
                path: dir.to_path_buf(),
            });
        }

        let lock_file = entries::adm_dir(dir).join("lock");
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_file)
        {
            Ok(_) => Ok(AdminLock { lock_file }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::WorkingCopyLocked {
                    path: dir.to_path_buf(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for AdminLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_file);
    }
}

/// Locks for one driver run: the anchor, plus the target directory
/// when the operand is a versioned directory of its own
#[derive(Debug)]
pub struct AdminLockSet {
    _locks: Vec<AdminLock>,
}

impl AdminLockSet {
    /// Lock the administrative areas an anchor/target operation needs
    pub fn acquire(anchor: &Path, target: &str) -> Result<AdminLockSet> {
        let mut locks = vec![AdminLock::acquire(anchor)?];
        if !target.is_empty() {
            let target_dir = anchor.join(target);
            if entries::is_versioned(&target_dir) {
                locks.push(AdminLock::acquire(&target_dir)?);
            }
        }
        Ok(AdminLockSet { _locks: locks })
    }
}
