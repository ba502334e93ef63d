//! Transaction objects
//!
//! A [`Transaction`] is a mutable workspace derived from a base
//! revision. The [`TxnOps`] trait is the capability set a transaction
//! exposes to callers (commit, abort, property access, the root), so
//! higher layers can hold `&dyn TxnOps` without naming the backend.
//! This store is the single concrete implementation.

use crate::fs::Filesystem;
use crate::tree::Root;
use tessera_core::{set_prop, Error, NodeRevisionId, PropMap, Result, Revnum, TxnId};
use tessera_store::{txn_store, TransactionKind};

/// Capability set of a live transaction
pub trait TxnOps {
    /// Promote this transaction to a new revision
    fn commit(&self) -> Result<Revnum>;

    /// Mark this transaction dead and purge its on-disk footprint
    fn abort(&self) -> Result<()>;

    /// One transaction property, or None if unset
    fn prop(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Snapshot of the full transaction property map
    fn proplist(&self) -> Result<PropMap>;

    /// Change one transaction property; None removes it
    fn change_prop(&self, name: &str, value: Option<&[u8]>) -> Result<()>;

    /// Mutable tree view of this transaction
    fn root(&self) -> Result<Root<'_>>;
}

/// A mutable workspace that becomes a revision on commit
pub struct Transaction<'fs> {
    fs: &'fs Filesystem,
    id: TxnId,
    base_rev: Revnum,
}

impl<'fs> Transaction<'fs> {
    pub(crate) fn new(fs: &'fs Filesystem, id: TxnId, base_rev: Revnum) -> Self {
        Transaction { fs, id, base_rev }
    }

    /// Opaque transaction id
    pub fn id(&self) -> &TxnId {
        &self.id
    }

    /// The revision this transaction was begun against
    pub fn base_revision(&self) -> Revnum {
        self.base_rev
    }

    /// Working root and base root node-revision ids
    ///
    /// # Errors
    /// Returns [`Error::TransactionNotMutable`] unless the transaction
    /// is in the normal kind; this guards the DAG layer against writing
    /// through a committed or dead transaction.
    pub fn ids(&self) -> Result<(NodeRevisionId, NodeRevisionId)> {
        let record = txn_store::read_txn(self.fs.repo_paths(), &self.id)?;
        if record.kind != TransactionKind::Normal {
            return Err(Error::TransactionNotMutable {
                txn_id: self.id.clone(),
            });
        }
        Ok((record.root_id, record.base_root_id))
    }
}

impl TxnOps for Transaction<'_> {
    fn commit(&self) -> Result<Revnum> {
        self.fs.commit_txn_impl(&self.id)
    }

    fn abort(&self) -> Result<()> {
        let paths = self.fs.repo_paths();
        let mut record = txn_store::read_txn(paths, &self.id)?;
        if record.kind == TransactionKind::Dead {
            return Err(Error::TransactionDead {
                txn_id: self.id.clone(),
            });
        }
        record.kind = TransactionKind::Dead;
        txn_store::write_txn_record(paths, &self.id, &record)?;

        tracing::warn!(target: "tessera::txn", txn_id = %self.id, "transaction aborted");

        // The dead marker is durable before the footprint goes away, so
        // a purge failure leaves a recoverable dead transaction behind.
        txn_store::purge_txn(paths, &self.id).map_err(|e| Error::TransactionCleanupFailed {
            txn_id: self.id.clone(),
            source: Box::new(e),
        })
    }

    fn prop(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.proplist()?.remove(name))
    }

    fn proplist(&self) -> Result<PropMap> {
        // Property reads work on any transaction that still exists.
        txn_store::read_txn(self.fs.repo_paths(), &self.id)?;
        txn_store::read_txn_props(self.fs.repo_paths(), &self.id)
    }

    fn change_prop(&self, name: &str, value: Option<&[u8]>) -> Result<()> {
        let record = txn_store::read_txn(self.fs.repo_paths(), &self.id)?;
        if record.kind != TransactionKind::Normal {
            return Err(Error::TransactionNotMutable {
                txn_id: self.id.clone(),
            });
        }
        let mut props = txn_store::read_txn_props(self.fs.repo_paths(), &self.id)?;
        set_prop(&mut props, name, value);
        txn_store::write_txn_props(self.fs.repo_paths(), &self.id, &props)
    }

    fn root(&self) -> Result<Root<'_>> {
        Ok(Root::for_txn(self.fs, self.id.clone()))
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("base_rev", &self.base_rev)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tessera_core::PROP_REVISION_DATE;

    fn test_fs() -> (tempfile::TempDir, Filesystem) {
        let dir = tempdir().unwrap();
        let fs = Filesystem::create(dir.path().join("repo")).unwrap();
        (dir, fs)
    }

    #[test]
    fn test_begin_txn_carries_creation_date() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        assert!(txn.prop(PROP_REVISION_DATE).unwrap().is_some());
    }

    #[test]
    fn test_ids_succeed_while_normal() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();

        let (root_id, base_root_id) = txn.ids().unwrap();
        assert_eq!(root_id, base_root_id);
    }

    #[test]
    fn test_change_prop_round_trip() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();

        txn.change_prop("tsr:log", Some(b"work in progress")).unwrap();
        assert_eq!(
            txn.prop("tsr:log").unwrap(),
            Some(b"work in progress".to_vec())
        );

        txn.change_prop("tsr:log", None).unwrap();
        assert_eq!(txn.prop("tsr:log").unwrap(), None);
    }

    #[test]
    fn test_abort_purges_footprint() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let id = txn.id().clone();

        txn.abort().unwrap();
        assert!(fs.list_transactions().unwrap().is_empty());
        assert!(matches!(
            fs.open_txn(&id),
            Err(Error::NoSuchTransaction { .. })
        ));
    }

    #[test]
    fn test_abort_twice_fails_cleanly() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        txn.abort().unwrap();

        // The handle still exists; the footprint does not.
        assert!(matches!(
            txn.abort(),
            Err(Error::NoSuchTransaction { .. })
        ));
        assert_eq!(fs.youngest_rev().unwrap(), 0);
    }

    #[test]
    fn test_begin_txn_against_missing_revision() {
        let (_dir, fs) = test_fs();
        assert!(matches!(
            fs.begin_txn(5),
            Err(Error::NoSuchRevision { rev: 5 })
        ));
    }

    #[test]
    fn test_open_txn_round_trip() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let id = txn.id().clone();

        let reopened = fs.open_txn(&id).unwrap();
        assert_eq!(reopened.base_revision(), 0);
        assert_eq!(reopened.id(), &id);
    }

    #[test]
    fn test_purge_requires_dead() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let id = txn.id().clone();

        assert!(matches!(
            fs.purge_txn(&id),
            Err(Error::TransactionNotDead { .. })
        ));
    }
}
