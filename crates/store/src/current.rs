//! Counter files: `db/current` and `db/txn-current`
//!
//! `db/current` is the single source of truth for the youngest
//! committed revision and the next free node/copy keys, written as one
//! whitespace-separated line:
//!
//! ```text
//! <youngest> <next-node-id> <next-copy-id>\n
//! ```
//!
//! `db/txn-current` holds the next free transaction key on a line of
//! its own. Both files are replaced atomically under the repository
//! write lock; readers see either the old or the new counters.

use crate::atomic::write_atomic;
use crate::keys;
use crate::paths::RepoPaths;
use tessera_core::{Error, Result, Revnum, TxnId};

/// Parsed contents of `db/current`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Current {
    /// Youngest committed revision
    pub youngest: Revnum,
    /// Next free node-id key
    pub next_node_id: String,
    /// Next free copy-id key
    pub next_copy_id: String,
}

impl Current {
    /// Counters for a freshly created repository
    ///
    /// Revision 0 exists and its root consumed node-id "0" and
    /// copy-id "0".
    pub fn initial() -> Self {
        Current {
            youngest: 0,
            next_node_id: "1".to_string(),
            next_copy_id: "1".to_string(),
        }
    }

    /// Read and parse `db/current`
    pub fn read(paths: &RepoPaths) -> Result<Self> {
        let bytes = std::fs::read(paths.current_file())?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| corrupt_current("not valid UTF-8"))?;

        let mut fields = text.split_whitespace();
        let youngest = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| corrupt_current("missing youngest revision"))?;
        let next_node_id = fields
            .next()
            .filter(|k| keys::is_valid_key(k))
            .ok_or_else(|| corrupt_current("missing next-node-id"))?
            .to_string();
        let next_copy_id = fields
            .next()
            .filter(|k| keys::is_valid_key(k))
            .ok_or_else(|| corrupt_current("missing next-copy-id"))?
            .to_string();
        if fields.next().is_some() {
            return Err(corrupt_current("trailing fields"));
        }

        Ok(Current {
            youngest,
            next_node_id,
            next_copy_id,
        })
    }

    /// Atomically rewrite `db/current`
    ///
    /// The caller must hold the repository write lock.
    pub fn write(&self, paths: &RepoPaths) -> Result<()> {
        let line = format!(
            "{} {} {}\n",
            self.youngest, self.next_node_id, self.next_copy_id
        );
        write_atomic(&paths.current_file(), line.as_bytes())?;
        Ok(())
    }
}

fn corrupt_current(details: &str) -> Error {
    Error::CorruptStore {
        details: format!("db/current: {}", details),
    }
}

fn corrupt_txn_current() -> Error {
    Error::CorruptStore {
        details: "db/txn-current: invalid contents".to_string(),
    }
}

/// Read the next free transaction key from `db/txn-current`
pub fn read_txn_current(paths: &RepoPaths) -> Result<String> {
    let bytes = std::fs::read(paths.txn_current_file())?;
    let key = std::str::from_utf8(&bytes)
        .map(|s| s.trim_end())
        .map_err(|_| corrupt_txn_current())?;
    if !keys::is_valid_key(key) {
        return Err(corrupt_txn_current());
    }
    Ok(key.to_string())
}

/// Atomically rewrite `db/txn-current`
///
/// The caller must hold the repository write lock.
pub fn write_txn_current(paths: &RepoPaths, key: &str) -> Result<()> {
    debug_assert!(keys::is_valid_key(key));
    write_atomic(&paths.txn_current_file(), format!("{}\n", key).as_bytes())?;
    Ok(())
}

/// Allocate the next transaction id and bump the counter
///
/// The caller must hold the repository write lock.
pub fn allocate_txn_id(paths: &RepoPaths) -> Result<TxnId> {
    let key = read_txn_current(paths)?;
    write_txn_current(paths, &keys::next_key(&key))?;
    Ok(TxnId::from(key))
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
    fn test_current_round_trip() {
        let (_dir, paths) = test_paths();
        let current = Current {
            youngest: 12,
            next_node_id: "3f".to_string(),
            next_copy_id: "2".to_string(),
        };

        current.write(&paths).unwrap();
        assert_eq!(Current::read(&paths).unwrap(), current);
    }

    #[test]
    fn test_current_initial() {
        let current = Current::initial();
        assert_eq!(current.youngest, 0);
        assert_eq!(current.next_node_id, "1");
        assert_eq!(current.next_copy_id, "1");
    }

    #[test]
    fn test_current_rejects_garbage() {
        let (_dir, paths) = test_paths();
        for garbage in ["", "x y z\n", "1 2\n", "1 2 3 4\n", "1 AB 0\n"] {
            std::fs::write(paths.current_file(), garbage).unwrap();
            assert!(
                matches!(Current::read(&paths), Err(Error::CorruptStore { .. })),
                "accepted {:?}",
                garbage
            );
        }
    }

    #[test]
    fn test_allocate_txn_id_bumps_counter() {
        let (_dir, paths) = test_paths();
        write_txn_current(&paths, "0").unwrap();

        assert_eq!(allocate_txn_id(&paths).unwrap(), TxnId::from("0"));
        assert_eq!(allocate_txn_id(&paths).unwrap(), TxnId::from("1"));
        assert_eq!(read_txn_current(&paths).unwrap(), "2");
    }
}
