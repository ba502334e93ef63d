//! Commit protocol
//!
//! Commit promotes a transaction to the next revision under the
//! repository write lock:
//!
//! 1. validate the transaction is in the normal kind
//! 2. acquire the write lock and re-read the youngest revision
//! 3. merge changes committed since the base; conflicts fail with
//!    `TxnOutOfDate`
//! 4. allocate revnum = youngest + 1
//! 5. serialize the transaction's tree into the revision file,
//!    rewriting transaction-resident ids to revision-resident ids
//! 6. write the revision properties (commit datestamp wins)
//! 7. atomically bump `current`
//! 8. mark the transaction committed
//!
//! The `current` bump is the publication point. A crash after step 5
//! but before step 7 leaves an orphan revision file that readers never
//! look at (they stop at `current`) and that the next commit replaces
//! by rename.

use crate::fs::Filesystem;
use crate::merge;
use std::collections::HashMap;
use tessera_core::{
    set_prop, Error, NodeRevisionId, Origin, Result, Revnum, TxnId, PROP_REVISION_DATE,
};
use tessera_store::{
    changes, rev_store, txn_store, Current, NodeContent, TransactionKind, WriteLock,
};

pub(crate) fn commit_txn(fs: &Filesystem, txn_id: &TxnId) -> Result<Revnum> {
    let paths = fs.repo_paths();

    // Serialize all writers; readers continue lock-free.
    let _lock = WriteLock::acquire(paths)?;

    let record = txn_store::read_txn(paths, txn_id)?;
    if record.kind != TransactionKind::Normal {
        return Err(Error::TransactionNotMutable {
            txn_id: txn_id.clone(),
        });
    }

    let current = Current::read(paths)?;
    let youngest = current.youngest;

    if record.base_rev < youngest {
        let source_root = fs.revision_root_id(youngest)?;
        if source_root != record.base_root_id {
            merge::merge(fs, txn_id, &record.base_root_id, &source_root)?;
        }
    }

    let new_rev = youngest + 1;

    // The merge may have moved the working root; re-read it.
    let mut record = txn_store::read_txn(paths, txn_id)?;

    let mut out = Vec::new();
    let mut id_map: HashMap<String, NodeRevisionId> = HashMap::new();
    let new_root_id = write_root(fs, &record.root_id, new_rev, &mut out, &mut id_map)?;

    let changes_offset = out.len();
    let folded = changes::fold(txn_store::read_changes(paths, txn_id)?);
    for mut change in folded {
        if let Origin::Transaction { .. } = change.node_id.origin {
            match id_map.get(&change.node_id.to_string()) {
                Some(new_id) => change.node_id = new_id.clone(),
                // The node became unreachable (for example its parent
                // was deleted after it was written); the surviving
                // delete entry tells the story.
                None => continue,
            }
        }
        out.extend_from_slice(change.to_line().as_bytes());
    }

    let root_offset = match &new_root_id.origin {
        Origin::Revision { offset, .. } => *offset,
        Origin::Transaction { .. } => unreachable!("root was just serialized"),
    };
    out.extend_from_slice(format!("{} {}\n", root_offset, changes_offset).as_bytes());

    rev_store::write_rev_file(paths, new_rev, &out)?;

    // Revision properties: the transaction's map, with the creation
    // datestamp overwritten by the commit datestamp.
    let mut props = txn_store::read_txn_props(paths, txn_id)?;
    set_prop(
        &mut props,
        PROP_REVISION_DATE,
        Some(chrono::Utc::now().to_rfc3339().as_bytes()),
    );
    rev_store::write_revision_props(paths, new_rev, &props)?;

    // Publication point.
    Current {
        youngest: new_rev,
        ..current
    }
    .write(paths)?;

    record.kind = TransactionKind::Committed;
    record.root_id = new_root_id;
    txn_store::write_txn_record(paths, txn_id, &record)?;

    tracing::info!(target: "tessera::txn", txn_id = %txn_id, new_rev, "transaction committed");
    Ok(new_rev)
}

/// Serialize the transaction's root into the revision file
///
/// An untouched (still revision-resident) root gets a fresh record with
/// a predecessor link, so every revision file contains its own root.
fn write_root(
    fs: &Filesystem,
    root_id: &NodeRevisionId,
    new_rev: Revnum,
    out: &mut Vec<u8>,
    id_map: &mut HashMap<String, NodeRevisionId>,
) -> Result<NodeRevisionId> {
    match &root_id.origin {
        Origin::Transaction { .. } => write_node_tree(fs, root_id, new_rev, out, id_map),
        Origin::Revision { .. } => {
            let mut node = fs.read_node(root_id)?;
            node.predecessor = Some(node.id.clone());
            node.id = NodeRevisionId::in_revision(
                node.id.node_id.clone(),
                node.id.copy_id.clone(),
                new_rev,
                out.len() as u64,
            );
            let id = node.id.clone();
            out.extend_from_slice(&node.to_bytes());
            Ok(id)
        }
    }
}

/// Depth-first serialization of transaction-resident nodes
///
/// Children are written before their parent so the parent's entry map
/// can carry final offsets; nodes still resident in older revisions
/// are shared, not copied, which is what makes commits minimal-change.
fn write_node_tree(
    fs: &Filesystem,
    id: &NodeRevisionId,
    new_rev: Revnum,
    out: &mut Vec<u8>,
    id_map: &mut HashMap<String, NodeRevisionId>,
) -> Result<NodeRevisionId> {
    if let Origin::Revision { .. } = id.origin {
        return Ok(id.clone());
    }

    let mut node = fs.read_node(id)?;

    if let NodeContent::Directory(entries) = &mut node.content {
        for entry in entries.values_mut() {
            if let Origin::Transaction { .. } = entry.id.origin {
                entry.id = write_node_tree(fs, &entry.id.clone(), new_rev, out, id_map)?;
            }
        }
    }

    let old_id = node.id.to_string();
    node.id = NodeRevisionId::in_revision(
        node.id.node_id.clone(),
        node.id.copy_id.clone(),
        new_rev,
        out.len() as u64,
    );
    let new_id = node.id.clone();
    out.extend_from_slice(&node.to_bytes());
    id_map.insert(old_id, new_id.clone());
    Ok(new_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TxnOps;
    use tempfile::tempdir;
    use tessera_store::ChangeAction;

    fn test_fs() -> (tempfile::TempDir, Filesystem) {
        let dir = tempdir().unwrap();
        let fs = Filesystem::create(dir.path().join("repo")).unwrap();
        (dir, fs)
    }

    #[test]
    fn test_commit_add_file() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();
        root.make_file("a").unwrap();
        root.set_file_contents("a", "hello").unwrap();

        let rev = txn.commit().unwrap();
        assert_eq!(rev, 1);
        assert_eq!(fs.youngest_rev().unwrap(), 1);

        let head = fs.revision_root(1).unwrap();
        assert_eq!(head.file_contents("a").unwrap(), b"hello");

        // The old revision does not know the new path.
        let old = fs.revision_root(0).unwrap();
        assert!(matches!(
            old.file_contents("a"),
            Err(Error::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_commit_allowed() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let rev = txn.commit().unwrap();
        assert_eq!(rev, 1);

        // Same tree, linked by a predecessor chain.
        let r0 = fs.revision_root_node(0).unwrap();
        let r1 = fs.revision_root_node(1).unwrap();
        assert!(r1.dir_entries().unwrap().is_empty());
        assert_eq!(r1.predecessor.as_ref(), Some(&r0.id));
        assert!(r0.id.same_line_of_history(&r1.id));
    }

    #[test]
    fn test_commit_marks_transaction_committed() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        txn.root().unwrap().make_file("a").unwrap();
        txn.commit().unwrap();

        // The tree is frozen now.
        assert!(matches!(
            txn.ids(),
            Err(Error::TransactionNotMutable { .. })
        ));
        assert!(matches!(
            txn.root().unwrap().make_file("b"),
            Err(Error::TransactionNotMutable { .. })
        ));
        assert!(matches!(
            txn.commit(),
            Err(Error::TransactionNotMutable { .. })
        ));
    }

    #[test]
    fn test_commit_writes_changes_log() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();
        root.make_dir("d").unwrap();
        root.make_file("d/f").unwrap();
        root.set_file_contents("d/f", "x").unwrap();
        txn.commit().unwrap();

        let changed = fs.paths_changed(1).unwrap();
        let summary: Vec<(String, ChangeAction)> = changed
            .iter()
            .map(|c| (c.path.clone(), c.action))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("d".to_string(), ChangeAction::Add),
                ("d/f".to_string(), ChangeAction::Add),
            ]
        );
    }

    #[test]
    fn test_sequential_commits_are_dense() {
        let (_dir, fs) = test_fs();
        for i in 1..=4 {
            let txn = fs.begin_txn(fs.youngest_rev().unwrap()).unwrap();
            txn.root().unwrap().make_file(&format!("f{}", i)).unwrap();
            assert_eq!(txn.commit().unwrap(), i);
        }
        assert_eq!(fs.youngest_rev().unwrap(), 4);

        // Every revision is fully readable.
        for rev in 0..=4 {
            fs.revision_root_node(rev).unwrap();
        }
    }

    #[test]
    fn test_conflicting_commit_is_out_of_date() {
        let (_dir, fs) = test_fs();
        let setup = fs.begin_txn(0).unwrap();
        setup.root().unwrap().make_file("x").unwrap();
        setup.commit().unwrap();

        let a = fs.begin_txn(1).unwrap();
        let b = fs.begin_txn(1).unwrap();
        a.root().unwrap().set_file_contents("x", "from a").unwrap();
        b.root().unwrap().set_file_contents("x", "from b").unwrap();

        assert_eq!(a.commit().unwrap(), 2);
        let err = b.commit().unwrap_err();
        assert!(err.is_out_of_date(), "got {:?}", err);

        // The losing transaction stays normal and must be aborted
        // explicitly.
        assert!(b.ids().is_ok());
        b.abort().unwrap();
        assert_eq!(fs.youngest_rev().unwrap(), 2);
        assert_eq!(
            fs.revision_root(2).unwrap().file_contents("x").unwrap(),
            b"from a"
        );
    }

    #[test]
    fn test_disjoint_commits_merge() {
        let (_dir, fs) = test_fs();
        let a = fs.begin_txn(0).unwrap();
        let b = fs.begin_txn(0).unwrap();
        a.root().unwrap().make_file("a").unwrap();
        b.root().unwrap().make_file("b").unwrap();

        assert_eq!(a.commit().unwrap(), 1);
        assert_eq!(b.commit().unwrap(), 2);

        // Revision 2 carries both files.
        let head = fs.revision_root(2).unwrap();
        assert!(head.check_path("a").unwrap().is_some());
        assert!(head.check_path("b").unwrap().is_some());
    }

    #[test]
    fn test_minimal_change_shares_untouched_nodes() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();
        root.make_dir("stable").unwrap();
        root.make_file("stable/f").unwrap();
        root.make_dir("hot").unwrap();
        root.make_file("hot/g").unwrap();
        txn.commit().unwrap();

        let txn = fs.begin_txn(1).unwrap();
        txn.root()
            .unwrap()
            .set_file_contents("hot/g", "new")
            .unwrap();
        txn.commit().unwrap();

        let r1 = fs.revision_root(1).unwrap();
        let r2 = fs.revision_root(2).unwrap();

        // Untouched subtree is shared byte-for-byte (same ids).
        assert_eq!(r1.node_id("stable").unwrap(), r2.node_id("stable").unwrap());
        assert_eq!(
            r1.node_id("stable/f").unwrap(),
            r2.node_id("stable/f").unwrap()
        );

        // Touched chain got new node revisions along the same history.
        assert_ne!(r1.node_id("hot/g").unwrap(), r2.node_id("hot/g").unwrap());
        assert!(r1
            .node_id("hot/g")
            .unwrap()
            .same_line_of_history(&r2.node_id("hot/g").unwrap()));
    }
}
