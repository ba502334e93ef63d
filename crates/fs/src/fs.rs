//! Filesystem handle
//!
//! A [`Filesystem`] is a process-scoped reference to one on-disk
//! store. Opening is cheap and idempotent for readers; writers
//! coordinate exclusively through the advisory write lock, never
//! through handle state, so any number of processes may hold handles
//! on the same store. The handle caches immutable revision file bytes
//! so repeated node reads do not re-read the file.

use crate::commit;
use crate::tree::Root;
use crate::txn::Transaction;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tessera_core::{
    set_prop, Error, NodeRevisionId, Origin, PropMap, Result, Revnum, TxnId, PROP_REVISION_DATE,
};
use tessera_store::{
    current, node_store, rev_store, txn_store, ChangedPath, Current, NodeRevision, RepoPaths,
    TransactionKind, TransactionRecord, WriteLock,
};

/// Store format this implementation reads and writes
pub const FORMAT_NUMBER: u32 = 1;

/// Handle on one on-disk repository
pub struct Filesystem {
    paths: RepoPaths,
    uuid: String,
    /// Immutable revision file bytes, keyed by revision
    rev_cache: Mutex<HashMap<Revnum, Arc<Vec<u8>>>>,
}

impl Filesystem {
    /// Create a new repository at `path`
    ///
    /// Initializes the full `db/` layout and commits revision 0: an
    /// empty root directory with a creation datestamp.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyExists`] if a repository is already
    /// present at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Filesystem> {
        let paths = RepoPaths::from_root(path);
        if paths.exists() {
            return Err(Error::AlreadyExists {
                path: paths.root().display().to_string(),
            });
        }
        paths.create_directories()?;

        let uuid = uuid::Uuid::new_v4().to_string();
        std::fs::write(paths.format_file(), format!("{}\n", FORMAT_NUMBER))?;
        std::fs::write(paths.uuid_file(), format!("{}\n", uuid))?;
        std::fs::write(paths.write_lock_file(), b"")?;
        current::write_txn_current(&paths, "0")?;

        // Revision 0: an empty root directory at offset 0.
        let root = NodeRevision::new_dir(NodeRevisionId::in_revision(
            "0".into(),
            "0".into(),
            0,
            0,
        ));
        let mut bytes = root.to_bytes();
        let changes_offset = bytes.len();
        bytes.extend_from_slice(format!("0 {}\n", changes_offset).as_bytes());
        rev_store::write_rev_file(&paths, 0, &bytes)?;

        let mut props = PropMap::new();
        set_prop(
            &mut props,
            PROP_REVISION_DATE,
            Some(chrono::Utc::now().to_rfc3339().as_bytes()),
        );
        rev_store::write_revision_props(&paths, 0, &props)?;

        Current::initial().write(&paths)?;

        tracing::info!(target: "tessera::fs", path = %paths.root().display(), %uuid, "repository created");
        Self::open(paths.root())
    }

    /// Open an existing repository at `path`
    ///
    /// Validates the layout and the store format. Read-only use takes
    /// no locks.
    pub fn open(path: impl AsRef<Path>) -> Result<Filesystem> {
        let paths = RepoPaths::from_root(path);
        paths.validate().map_err(|e| Error::CorruptStore {
            details: e.to_string(),
        })?;

        let format_bytes = std::fs::read(paths.format_file())?;
        let format: u32 = std::str::from_utf8(&format_bytes)
            .ok()
            .map(str::trim)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::CorruptStore {
                details: "unreadable format file".to_string(),
            })?;
        if format != FORMAT_NUMBER {
            return Err(Error::CorruptStore {
                details: format!("unsupported store format {}", format),
            });
        }

        let uuid_bytes = std::fs::read(paths.uuid_file())?;
        let uuid = std::str::from_utf8(&uuid_bytes)
            .map_err(|_| Error::CorruptStore {
                details: "unreadable uuid file".to_string(),
            })?
            .trim()
            .to_string();

        Ok(Filesystem {
            paths,
            uuid,
            rev_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory of this repository
    pub fn path(&self) -> &Path {
        self.paths.root()
    }

    /// Repository uuid, stamped at create time
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub(crate) fn repo_paths(&self) -> &RepoPaths {
        &self.paths
    }

    /// Youngest committed revision
    pub fn youngest_rev(&self) -> Result<Revnum> {
        Ok(Current::read(&self.paths)?.youngest)
    }

    /// Fail with `NoSuchRevision` for revisions past youngest
    pub(crate) fn ensure_valid_rev(&self, rev: Revnum) -> Result<()> {
        if rev > self.youngest_rev()? {
            Err(Error::NoSuchRevision { rev })
        } else {
            Ok(())
        }
    }

    // === Revision properties ===

    /// Snapshot of a revision's full property map
    pub fn revision_proplist(&self, rev: Revnum) -> Result<PropMap> {
        self.ensure_valid_rev(rev)?;
        rev_store::read_revision_props(&self.paths, rev)
    }

    /// One revision property, or None if unset
    pub fn revision_prop(&self, rev: Revnum, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.revision_proplist(rev)?.remove(name))
    }

    /// Atomically change one revision property
    ///
    /// A `None` value removes the property. This is the only sanctioned
    /// mutation of committed state; it runs under the repository write
    /// lock and replaces the property file by rename, so concurrent
    /// readers observe either the old map or the new map.
    pub fn change_rev_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> Result<()> {
        self.ensure_valid_rev(rev)?;
        let _lock = WriteLock::acquire(&self.paths)?;

        let mut props = rev_store::read_revision_props(&self.paths, rev)?;
        set_prop(&mut props, name, value);
        rev_store::write_revision_props(&self.paths, rev, &props)?;

        tracing::debug!(target: "tessera::fs", rev, name, "revision property changed");
        Ok(())
    }

    /// Folded change log of a committed revision
    pub fn paths_changed(&self, rev: Revnum) -> Result<Vec<ChangedPath>> {
        self.ensure_valid_rev(rev)?;
        let bytes = self.rev_file_bytes(rev)?;
        rev_store::changes_from_bytes(&bytes, rev)
    }

    // === Node access ===

    /// Revision file bytes, cached; revision files are immutable once
    /// `current` points past them.
    pub(crate) fn rev_file_bytes(&self, rev: Revnum) -> Result<Arc<Vec<u8>>> {
        if let Some(bytes) = self.rev_cache.lock().get(&rev) {
            return Ok(Arc::clone(bytes));
        }
        let bytes = Arc::new(rev_store::read_rev_file(&self.paths, rev)?);
        self.rev_cache.lock().insert(rev, Arc::clone(&bytes));
        Ok(bytes)
    }

    /// Root node-revision id of a committed revision
    pub(crate) fn revision_root_id(&self, rev: Revnum) -> Result<NodeRevisionId> {
        self.ensure_valid_rev(rev)?;
        let bytes = self.rev_file_bytes(rev)?;
        rev_store::root_id_from_bytes(&bytes, rev)
    }

    /// Read any node revision, wherever it lives
    pub(crate) fn read_node(&self, id: &NodeRevisionId) -> Result<NodeRevision> {
        match &id.origin {
            Origin::Transaction { .. } => node_store::read_txn_node(&self.paths, id),
            Origin::Revision { rev, offset } => {
                let bytes = self.rev_file_bytes(*rev)?;
                node_store::parse_rev_node_at(&bytes, *rev, *offset)
            }
        }
    }

    // === Roots ===

    /// Immutable tree view of a committed revision
    pub fn revision_root(&self, rev: Revnum) -> Result<Root<'_>> {
        self.ensure_valid_rev(rev)?;
        Ok(Root::for_revision(self, rev))
    }

    // === Transactions ===

    /// Begin a transaction against a base revision
    ///
    /// Allocates a fresh transaction id under the write lock and
    /// initializes the working root to the base revision's root. The
    /// new transaction carries a creation datestamp so operators can
    /// age abandoned transactions; commit overwrites it with the
    /// revision datestamp.
    pub fn begin_txn(&self, base_rev: Revnum) -> Result<Transaction<'_>> {
        self.ensure_valid_rev(base_rev)?;
        let base_root_id = self.revision_root_id(base_rev)?;

        let txn_id = {
            let _lock = WriteLock::acquire(&self.paths)?;
            current::allocate_txn_id(&self.paths)?
        };

        let record = TransactionRecord {
            kind: TransactionKind::Normal,
            base_rev,
            root_id: base_root_id.clone(),
            base_root_id,
        };
        txn_store::create_txn(&self.paths, &txn_id, &record)?;

        let mut props = PropMap::new();
        set_prop(
            &mut props,
            PROP_REVISION_DATE,
            Some(chrono::Utc::now().to_rfc3339().as_bytes()),
        );
        txn_store::write_txn_props(&self.paths, &txn_id, &props)?;

        tracing::debug!(target: "tessera::txn", txn_id = %txn_id, base_rev, "transaction started");
        Ok(Transaction::new(self, txn_id, base_rev))
    }

    /// Open an existing live transaction by id
    ///
    /// # Errors
    /// Returns [`Error::TransactionDead`] for aborted-but-unpurged
    /// transactions and [`Error::NoSuchTransaction`] for unknown ids.
    pub fn open_txn(&self, txn_id: &TxnId) -> Result<Transaction<'_>> {
        let record = txn_store::read_txn(&self.paths, txn_id)?;
        if record.kind == TransactionKind::Dead {
            return Err(Error::TransactionDead {
                txn_id: txn_id.clone(),
            });
        }
        Ok(Transaction::new(self, txn_id.clone(), record.base_rev))
    }

    /// Remove a dead transaction's on-disk footprint
    ///
    /// # Errors
    /// Returns [`Error::TransactionNotDead`] if the transaction is
    /// still live; this guards the destructive path against races with
    /// an active writer.
    pub fn purge_txn(&self, txn_id: &TxnId) -> Result<()> {
        let record = txn_store::read_txn(&self.paths, txn_id)?;
        if record.kind != TransactionKind::Dead {
            return Err(Error::TransactionNotDead {
                txn_id: txn_id.clone(),
            });
        }
        txn_store::purge_txn(&self.paths, txn_id)
    }

    /// Enumerate all transactions with an on-disk footprint
    pub fn list_transactions(&self) -> Result<Vec<TxnId>> {
        txn_store::list_txns(&self.paths)
    }

    pub(crate) fn commit_txn_impl(&self, txn_id: &TxnId) -> Result<Revnum> {
        commit::commit_txn(self, txn_id)
    }

}

#[cfg(test)]
impl Filesystem {
    /// Root directory node of a revision; test helper
    pub(crate) fn revision_root_node(&self, rev: Revnum) -> Result<NodeRevision> {
        let id = self.revision_root_id(rev)?;
        let node = self.read_node(&id)?;
        if node.dir_entries().is_err() {
            return Err(Error::CorruptRevision {
                rev,
                details: "revision root is not a directory".to_string(),
            });
        }
        Ok(node)
    }
}

impl std::fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filesystem")
            .field("path", &self.paths.root())
            .field("uuid", &self.uuid)
            .finish()
    }
}
