//! Transaction persistence
//!
//! Each in-progress transaction owns a directory under
//! `db/transactions/<id>.txn/` holding its record file (kind, base
//! revision, working root, base root), its property file, its ordered
//! change log, and one file per transaction-resident node revision.
//! Dead transactions keep their footprint until purged so operators
//! can inspect what an aborted writer was doing.

use crate::atomic::write_atomic;
use crate::changes::{self, ChangedPath};
use crate::hashfile;
use crate::paths::RepoPaths;
use std::io::Write;
use tessera_core::{Error, NodeRevisionId, PropMap, Result, Revnum, TxnId};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Mutable, may commit or abort
    Normal,
    /// Promoted to a revision; tree frozen
    Committed,
    /// Aborted; awaiting purge
    Dead,
}

impl TransactionKind {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Normal => "normal",
            TransactionKind::Committed => "committed",
            TransactionKind::Dead => "dead",
        }
    }

    fn from_str_token(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(TransactionKind::Normal),
            "committed" => Some(TransactionKind::Committed),
            "dead" => Some(TransactionKind::Dead),
            _ => None,
        }
    }
}

/// On-disk transaction record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Lifecycle state
    pub kind: TransactionKind,
    /// Revision this transaction is based on
    pub base_rev: Revnum,
    /// Current working root (moves as the tree is cloned)
    pub root_id: NodeRevisionId,
    /// Root of the base revision (frozen at begin)
    pub base_root_id: NodeRevisionId,
}

impl TransactionRecord {
    fn to_bytes(&self) -> Vec<u8> {
        let mut record = PropMap::new();
        record.insert("kind".to_string(), self.kind.as_str().as_bytes().to_vec());
        record.insert(
            "base-rev".to_string(),
            self.base_rev.to_string().into_bytes(),
        );
        record.insert("root-id".to_string(), self.root_id.to_string().into_bytes());
        record.insert(
            "base-root-id".to_string(),
            self.base_root_id.to_string().into_bytes(),
        );
        hashfile::to_bytes(&record)
    }

    fn from_bytes(bytes: &[u8], txn_id: &TxnId) -> Result<Self> {
        let corrupt = |details: &str| Error::CorruptStore {
            details: format!("transaction '{}': {}", txn_id, details),
        };

        let mut record = hashfile::from_bytes(bytes)?;
        let mut take_str = |key: &str| -> Result<String> {
            let bytes = record
                .remove(key)
                .ok_or_else(|| corrupt(&format!("missing {}", key)))?;
            String::from_utf8(bytes).map_err(|_| corrupt(&format!("binary {}", key)))
        };

        let kind = TransactionKind::from_str_token(&take_str("kind")?)
            .ok_or_else(|| corrupt("unknown kind"))?;
        let base_rev = take_str("base-rev")?
            .parse()
            .map_err(|_| corrupt("malformed base-rev"))?;
        let root_id = NodeRevisionId::from_string(&take_str("root-id")?)
            .ok_or_else(|| corrupt("malformed root-id"))?;
        let base_root_id = NodeRevisionId::from_string(&take_str("base-root-id")?)
            .ok_or_else(|| corrupt("malformed base-root-id"))?;

        Ok(TransactionRecord {
            kind,
            base_rev,
            root_id,
            base_root_id,
        })
    }
}

/// Create the directory and record for a fresh transaction
pub fn create_txn(paths: &RepoPaths, txn_id: &TxnId, record: &TransactionRecord) -> Result<()> {
    std::fs::create_dir(paths.txn_dir(txn_id))?;
    write_txn_record(paths, txn_id, record)?;
    tracing::debug!(target: "tessera::txn", txn_id = %txn_id, base_rev = record.base_rev, "transaction created");
    Ok(())
}

/// Read a transaction record
///
/// # Errors
/// Returns `NoSuchTransaction` if the transaction directory or record
/// does not exist.
pub fn read_txn(paths: &RepoPaths, txn_id: &TxnId) -> Result<TransactionRecord> {
    let bytes = std::fs::read(paths.txn_rec_file(txn_id)).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NoSuchTransaction {
                txn_id: txn_id.clone(),
            }
        } else {
            Error::from(e)
        }
    })?;
    TransactionRecord::from_bytes(&bytes, txn_id)
}

/// Atomically rewrite a transaction record
pub fn write_txn_record(
    paths: &RepoPaths,
    txn_id: &TxnId,
    record: &TransactionRecord,
) -> Result<()> {
    write_atomic(&paths.txn_rec_file(txn_id), &record.to_bytes())?;
    Ok(())
}

/// Read a transaction's property map
///
/// A missing props file reads as the empty map.
pub fn read_txn_props(paths: &RepoPaths, txn_id: &TxnId) -> Result<PropMap> {
    match std::fs::read(paths.txn_props_file(txn_id)) {
        Ok(bytes) => hashfile::from_bytes(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PropMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Atomically rewrite a transaction's property map
pub fn write_txn_props(paths: &RepoPaths, txn_id: &TxnId, props: &PropMap) -> Result<()> {
    write_atomic(&paths.txn_props_file(txn_id), &hashfile::to_bytes(props))?;
    Ok(())
}

/// Append one entry to the transaction's change log
pub fn append_change(paths: &RepoPaths, txn_id: &TxnId, change: &ChangedPath) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.txn_changes_file(txn_id))?;
    file.write_all(change.to_line().as_bytes())?;
    Ok(())
}

/// Read the transaction's raw (unfolded) change log
pub fn read_changes(paths: &RepoPaths, txn_id: &TxnId) -> Result<Vec<ChangedPath>> {
    match std::fs::read(paths.txn_changes_file(txn_id)) {
        Ok(bytes) => changes::from_bytes(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Remove a transaction's entire on-disk footprint
///
/// # Errors
/// Returns `NoSuchTransaction` if the directory is already gone.
pub fn purge_txn(paths: &RepoPaths, txn_id: &TxnId) -> Result<()> {
    let dir = paths.txn_dir(txn_id);
    std::fs::remove_dir_all(&dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NoSuchTransaction {
                txn_id: txn_id.clone(),
            }
        } else {
            Error::from(e)
        }
    })?;
    tracing::debug!(target: "tessera::txn", txn_id = %txn_id, "transaction purged");
    Ok(())
}

/// Enumerate all transactions with an on-disk footprint, sorted by id
pub fn list_txns(paths: &RepoPaths) -> Result<Vec<TxnId>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(paths.txns_dir())? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(id) = RepoPaths::txn_id_from_dir_name(name) {
                ids.push(id);
            }
        }
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeAction;
    use tempfile::tempdir;

    fn test_paths() -> (tempfile::TempDir, RepoPaths) {
        let dir = tempdir().unwrap();
        let paths = RepoPaths::from_root(dir.path().join("repo"));
        paths.create_directories().unwrap();
        (dir, paths)
    }

    fn sample_record() -> TransactionRecord {
        TransactionRecord {
            kind: TransactionKind::Normal,
            base_rev: 4,
            root_id: NodeRevisionId::from_string("0.0.r4/128").unwrap(),
            base_root_id: NodeRevisionId::from_string("0.0.r4/128").unwrap(),
        }
    }

    #[test]
    fn test_record_round_trip() {
        let (_dir, paths) = test_paths();
        let id = TxnId::from("3");

        create_txn(&paths, &id, &sample_record()).unwrap();
        assert_eq!(read_txn(&paths, &id).unwrap(), sample_record());
    }

    #[test]
    fn test_read_missing_txn() {
        let (_dir, paths) = test_paths();
        let err = read_txn(&paths, &TxnId::from("9")).unwrap_err();
        assert!(matches!(err, Error::NoSuchTransaction { .. }));
    }

    #[test]
    fn test_kind_transitions_persist() {
        let (_dir, paths) = test_paths();
        let id = TxnId::from("3");
        create_txn(&paths, &id, &sample_record()).unwrap();

        let mut record = read_txn(&paths, &id).unwrap();
        record.kind = TransactionKind::Dead;
        write_txn_record(&paths, &id, &record).unwrap();

        assert_eq!(read_txn(&paths, &id).unwrap().kind, TransactionKind::Dead);
    }

    #[test]
    fn test_props_round_trip_and_default_empty() {
        let (_dir, paths) = test_paths();
        let id = TxnId::from("3");
        create_txn(&paths, &id, &sample_record()).unwrap();

        assert!(read_txn_props(&paths, &id).unwrap().is_empty());

        let mut props = PropMap::new();
        props.insert("tsr:date".to_string(), b"2024-01-01T00:00:00Z".to_vec());
        write_txn_props(&paths, &id, &props).unwrap();
        assert_eq!(read_txn_props(&paths, &id).unwrap(), props);
    }

    #[test]
    fn test_change_log_appends_in_order() {
        let (_dir, paths) = test_paths();
        let id = TxnId::from("3");
        create_txn(&paths, &id, &sample_record()).unwrap();

        for (i, path) in ["a", "b", "a"].iter().enumerate() {
            append_change(
                &paths,
                &id,
                &ChangedPath {
                    path: path.to_string(),
                    node_id: NodeRevisionId::from_string(&format!("{}.0.t3", i + 1)).unwrap(),
                    action: ChangeAction::Modify,
                },
            )
            .unwrap();
        }

        let log = read_changes(&paths, &id).unwrap();
        let paths_seen: Vec<_> = log.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths_seen, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_purge_removes_footprint() {
        let (_dir, paths) = test_paths();
        let id = TxnId::from("3");
        create_txn(&paths, &id, &sample_record()).unwrap();

        purge_txn(&paths, &id).unwrap();
        assert!(!paths.txn_dir(&id).exists());
        assert!(matches!(
            purge_txn(&paths, &id),
            Err(Error::NoSuchTransaction { .. })
        ));
    }

    #[test]
    fn test_list_txns_sorted() {
        let (_dir, paths) = test_paths();
        for id in ["2", "0", "1"] {
            create_txn(&paths, &TxnId::from(id), &sample_record()).unwrap();
        }

        let ids = list_txns(&paths).unwrap();
        let names: Vec<_> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(names, vec!["0", "1", "2"]);
    }
}
