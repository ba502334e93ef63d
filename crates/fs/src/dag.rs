//! DAG operations over node revisions
//!
//! All tree mutation is copy-on-write from the transaction root down:
//! writing through a path first clones every committed node on the
//! parent chain into the transaction (with a predecessor link back to
//! the node it was cloned from), then rewrites only
//! transaction-resident records. Committed node revisions are never
//! touched.
//!
//! Everything here operates relative to a transaction, whose record
//! kind determines mutability; the read-side helpers take any root
//! node-revision id.

use crate::fs::Filesystem;
use crate::path;
use tessera_core::{Error, NodeKind, NodeRevisionId, PropMap, Result, TxnId};
use tessera_store::{
    node_store, txn_store, ChangeAction, ChangedPath, Current, DirEntry, NodeContent,
    NodeRevision, TransactionKind, TransactionRecord, WriteLock,
};

/// One step of a resolved path: the node plus its name in the parent
/// (None for the root).
struct PathStep {
    node: NodeRevision,
    name: Option<String>,
}

/// Resolve `path` from `root_id`, returning the chain root..target
fn open_path(fs: &Filesystem, root_id: &NodeRevisionId, target: &str) -> Result<Vec<PathStep>> {
    let components = path::split(target)?;
    let mut chain = vec![PathStep {
        node: fs.read_node(root_id)?,
        name: None,
    }];

    for (i, name) in components.iter().enumerate() {
        let here = &chain.last().expect("chain is never empty").node;
        let partial = || components[..=i].join("/");

        let entries = match here.dir_entries() {
            Ok(entries) => entries,
            Err(_) => {
                return Err(Error::NotDirectory {
                    path: components[..i].join("/"),
                })
            }
        };
        let entry = entries.get(*name).ok_or_else(|| Error::PathNotFound {
            path: partial(),
        })?;

        let node = fs.read_node(&entry.id)?;
        chain.push(PathStep {
            node,
            name: Some(name.to_string()),
        });
    }
    Ok(chain)
}

/// Node revision at `path` under `root_id`
///
/// Repeated calls with the same root and path return the same
/// node-revision id; nothing here allocates.
pub(crate) fn get_node(
    fs: &Filesystem,
    root_id: &NodeRevisionId,
    target: &str,
) -> Result<NodeRevision> {
    Ok(open_path(fs, root_id, target)?
        .pop()
        .expect("chain is never empty")
        .node)
}

/// Kind of the node at `path`, or None if absent
pub(crate) fn check_path(
    fs: &Filesystem,
    root_id: &NodeRevisionId,
    target: &str,
) -> Result<Option<NodeKind>> {
    match get_node(fs, root_id, target) {
        Ok(node) => Ok(Some(node.kind())),
        Err(Error::PathNotFound { .. }) | Err(Error::NotDirectory { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read the transaction record, requiring the normal (mutable) kind
///
/// This is the single gate protecting committed and dead transactions
/// from writes through the DAG.
fn mutable_record(fs: &Filesystem, txn_id: &TxnId) -> Result<TransactionRecord> {
    let record = txn_store::read_txn(fs.repo_paths(), txn_id)?;
    if record.kind != TransactionKind::Normal {
        return Err(Error::TransactionNotMutable {
            txn_id: txn_id.clone(),
        });
    }
    Ok(record)
}

/// Clone the chain down to `target` into the transaction as needed and
/// return the mutable chain (root..target)
///
/// A node already created in this transaction is returned as-is; a
/// committed node is cloned with a predecessor link, its parent's
/// entry (or the transaction's root pointer) rewritten to the clone.
fn make_path_mutable(
    fs: &Filesystem,
    txn_id: &TxnId,
    target: &str,
) -> Result<Vec<NodeRevision>> {
    let mut record = mutable_record(fs, txn_id)?;
    let chain = open_path(fs, &record.root_id, target)?;
    let mut mutable: Vec<NodeRevision> = Vec::with_capacity(chain.len());

    for (i, step) in chain.into_iter().enumerate() {
        let PathStep { node, name } = step;
        let node = if node.id.is_mutable_in(txn_id) {
            node
        } else {
            let clone_id = NodeRevisionId::in_txn(
                node.id.node_id.clone(),
                node.id.copy_id.clone(),
                txn_id.clone(),
            );
            let cloned = NodeRevision {
                id: clone_id.clone(),
                predecessor: Some(node.id.clone()),
                props: node.props,
                content: node.content,
            };
            node_store::write_txn_node(fs.repo_paths(), &cloned)?;

            if i == 0 {
                record.root_id = clone_id;
                txn_store::write_txn_record(fs.repo_paths(), txn_id, &record)?;
            } else {
                let parent = mutable.last_mut().expect("non-root step has a parent");
                let name = name.expect("non-root step has a name");
                let kind = cloned.kind();
                parent
                    .dir_entries_mut()?
                    .insert(name, DirEntry { id: clone_id, kind });
                node_store::write_txn_node(fs.repo_paths(), parent)?;
            }
            cloned
        };
        mutable.push(node);
    }
    Ok(mutable)
}

/// Allocate a fresh node id under the repository write lock
fn allocate_node_id(fs: &Filesystem) -> Result<String> {
    let _lock = WriteLock::acquire(fs.repo_paths())?;
    let mut counters = Current::read(fs.repo_paths())?;
    let key = counters.next_node_id.clone();
    counters.next_node_id = tessera_store::keys::next_key(&key);
    counters.write(fs.repo_paths())?;
    Ok(key)
}

fn log_change(
    fs: &Filesystem,
    txn_id: &TxnId,
    target: &str,
    node_id: NodeRevisionId,
    action: ChangeAction,
) -> Result<()> {
    txn_store::append_change(
        fs.repo_paths(),
        txn_id,
        &ChangedPath {
            path: target.to_string(),
            node_id,
            action,
        },
    )
}

/// Create an empty file or directory at `path`
pub(crate) fn make_node(
    fs: &Filesystem,
    txn_id: &TxnId,
    target: &str,
    kind: NodeKind,
) -> Result<NodeRevisionId> {
    let target = path::canonicalize(target)?;
    let (parent_path, name) = path::split_dirname(&target);
    if name.is_empty() {
        return Err(Error::AlreadyExists {
            path: "/".to_string(),
        });
    }

    let mut chain = make_path_mutable(fs, txn_id, parent_path)?;
    let parent = chain.last_mut().expect("chain is never empty");
    if parent.kind() != NodeKind::Directory {
        return Err(Error::NotDirectory {
            path: parent_path.to_string(),
        });
    }
    if parent.dir_entries()?.contains_key(name) {
        return Err(Error::AlreadyExists { path: target });
    }

    let node_key = allocate_node_id(fs)?;
    let id = NodeRevisionId::in_txn(node_key.into(), "0".into(), txn_id.clone());
    let node = match kind {
        NodeKind::File => NodeRevision::new_file(id.clone()),
        NodeKind::Directory => NodeRevision::new_dir(id.clone()),
    };
    node_store::write_txn_node(fs.repo_paths(), &node)?;

    parent.dir_entries_mut()?.insert(
        name.to_string(),
        DirEntry {
            id: id.clone(),
            kind,
        },
    );
    node_store::write_txn_node(fs.repo_paths(), parent)?;

    log_change(fs, txn_id, &target, id.clone(), ChangeAction::Add)?;
    Ok(id)
}

/// Remove the entry at `path` from its parent directory
pub(crate) fn delete_entry(fs: &Filesystem, txn_id: &TxnId, target: &str) -> Result<()> {
    let target = path::canonicalize(target)?;
    let (parent_path, name) = path::split_dirname(&target);
    if name.is_empty() {
        return Err(Error::RootDirectory);
    }

    let mut chain = make_path_mutable(fs, txn_id, parent_path)?;
    let parent = chain.last_mut().expect("chain is never empty");
    let removed = parent
        .dir_entries_mut()?
        .remove(name)
        .ok_or(Error::PathNotFound {
            path: target.clone(),
        })?;
    node_store::write_txn_node(fs.repo_paths(), parent)?;

    log_change(fs, txn_id, &target, removed.id, ChangeAction::Delete)
}

/// Replace the byte contents of the file at `path`
pub(crate) fn set_contents(
    fs: &Filesystem,
    txn_id: &TxnId,
    target: &str,
    contents: Vec<u8>,
) -> Result<()> {
    let target = path::canonicalize(target)?;
    let mut chain = make_path_mutable(fs, txn_id, &target)?;
    let node = chain.last_mut().expect("chain is never empty");
    match &mut node.content {
        NodeContent::File(bytes) => *bytes = contents,
        NodeContent::Directory(_) => {
            return Err(Error::NotFile {
                path: target.clone(),
            })
        }
    }
    node_store::write_txn_node(fs.repo_paths(), node)?;

    log_change(fs, txn_id, &target, node.id.clone(), ChangeAction::Modify)
}

/// Replace the property map of the node at `path`
pub(crate) fn set_node_props(
    fs: &Filesystem,
    txn_id: &TxnId,
    target: &str,
    props: PropMap,
) -> Result<()> {
    let target = path::canonicalize(target)?;
    let mut chain = make_path_mutable(fs, txn_id, &target)?;
    let node = chain.last_mut().expect("chain is never empty");
    node.props = props;
    node_store::write_txn_node(fs.repo_paths(), node)?;

    log_change(fs, txn_id, &target, node.id.clone(), ChangeAction::Modify)
}

/// Point `parent/name` at an existing node revision without logging
///
/// Used by the commit-time merge to graft entries already committed by
/// newer revisions into the transaction; those edits belong to other
/// revisions' change logs, not this transaction's.
pub(crate) fn set_entry_unlogged(
    fs: &Filesystem,
    txn_id: &TxnId,
    parent_path: &str,
    name: &str,
    entry: DirEntry,
) -> Result<()> {
    let mut chain = make_path_mutable(fs, txn_id, parent_path)?;
    let parent = chain.last_mut().expect("chain is never empty");
    parent.dir_entries_mut()?.insert(name.to_string(), entry);
    node_store::write_txn_node(fs.repo_paths(), parent)
}

/// Remove `parent/name` without logging; merge-only counterpart of
/// [`set_entry_unlogged`]
pub(crate) fn remove_entry_unlogged(
    fs: &Filesystem,
    txn_id: &TxnId,
    parent_path: &str,
    name: &str,
) -> Result<()> {
    let mut chain = make_path_mutable(fs, txn_id, parent_path)?;
    let parent = chain.last_mut().expect("chain is never empty");
    parent.dir_entries_mut()?.remove(name);
    node_store::write_txn_node(fs.repo_paths(), parent)
}

/// Current working root of a transaction (no mutability requirement)
pub(crate) fn txn_root_id(fs: &Filesystem, txn_id: &TxnId) -> Result<NodeRevisionId> {
    Ok(txn_store::read_txn(fs.repo_paths(), txn_id)?.root_id)
}
