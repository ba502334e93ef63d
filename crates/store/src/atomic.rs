//! Atomic file replacement
//!
//! Every mutable bookkeeping file in the store (`current`, revision
//! property files, transaction records) is replaced with
//! write-fsync-rename so a reader observes either the old content or
//! the new content, never a torn file. On Unix the parent directory is
//! fsynced after the rename so the new directory entry itself is
//! durable.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Extension appended to the sibling temporary file
const TMP_EXTENSION: &str = "tmp";

/// Atomically replace `path` with `contents`.
///
/// Writes a sibling temporary file, fsyncs it, then renames it over the
/// canonical path. Callers that require mutual exclusion between
/// writers must hold the repository write lock; rename atomicity alone
/// protects readers.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension(TMP_EXTENSION);

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            let dir_fd = File::open(parent)?;
            dir_fd.sync_all()?;
        }
    }

    Ok(())
}
