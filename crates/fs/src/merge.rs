//! Commit-time merge
//!
//! When a transaction commits against a HEAD newer than its base, the
//! changes committed in between are folded into the transaction's tree
//! by a three-way directory walk: ancestor = the transaction's base
//! root, source = the current youngest root, target = the
//! transaction's working root. Entries changed only in source are
//! grafted into the target; entries changed in both are a conflict and
//! fail the commit with `TxnOutOfDate`, except directories changed on
//! both sides, which merge recursively.

use crate::dag;
use crate::fs::Filesystem;
use crate::path;
use std::collections::BTreeSet;
use tessera_core::{Error, NodeKind, NodeRevisionId, Result, TxnId};
use tessera_store::{DirEntry, NodeRevision};

/// Fold newer committed changes into the transaction's tree
///
/// # Errors
/// Returns [`Error::TxnOutOfDate`] naming the first conflicting path.
pub(crate) fn merge(
    fs: &Filesystem,
    txn_id: &TxnId,
    ancestor_root: &NodeRevisionId,
    source_root: &NodeRevisionId,
) -> Result<()> {
    let ancestor = fs.read_node(ancestor_root)?;
    let source = fs.read_node(source_root)?;
    merge_dirs(fs, txn_id, "", &ancestor, &source)
}

fn merge_dirs(
    fs: &Filesystem,
    txn_id: &TxnId,
    dir_path: &str,
    ancestor: &NodeRevision,
    source: &NodeRevision,
) -> Result<()> {
    let anc_entries = ancestor.dir_entries()?;
    let src_entries = source.dir_entries()?;

    let names: BTreeSet<&String> = anc_entries.keys().chain(src_entries.keys()).collect();

    for name in names {
        let a = anc_entries.get(name.as_str());
        let s = src_entries.get(name.as_str());
        if a == s {
            // Untouched between base and HEAD.
            continue;
        }

        let child_path = path::join(dir_path, name);
        let t = target_entry(fs, txn_id, dir_path, name)?;

        let target_unchanged = match (&a, &t) {
            (None, None) => true,
            (Some(a), Some(t)) => a.id == t.id,
            _ => false,
        };

        if target_unchanged {
            // Only the source side moved; graft its entry into the
            // transaction. These edits already belong to committed
            // revisions' change logs, so they are not logged here.
            match s {
                Some(entry) => {
                    dag::set_entry_unlogged(fs, txn_id, dir_path, name, entry.clone())?
                }
                None => dag::remove_entry_unlogged(fs, txn_id, dir_path, name)?,
            }
            continue;
        }

        // Both sides changed this entry. Directories on all three
        // sides merge recursively; anything else is a conflict.
        match (a, s, &t) {
            (Some(a_entry), Some(s_entry), Some(t_entry))
                if a_entry.kind == NodeKind::Directory
                    && s_entry.kind == NodeKind::Directory
                    && t_entry.kind == NodeKind::Directory =>
            {
                let anc_child = fs.read_node(&a_entry.id)?;
                let src_child = fs.read_node(&s_entry.id)?;
                merge_dirs(fs, txn_id, &child_path, &anc_child, &src_child)?;
            }
            _ => {
                return Err(Error::TxnOutOfDate {
                    txn_id: txn_id.clone(),
                    path: child_path,
                })
            }
        }
    }

    Ok(())
}

/// Current entry for `name` in the transaction's view of `dir_path`
///
/// Re-resolved through the working root on every call because grafts
/// clone directories as they go.
fn target_entry(
    fs: &Filesystem,
    txn_id: &TxnId,
    dir_path: &str,
    name: &str,
) -> Result<Option<DirEntry>> {
    let root_id = dag::txn_root_id(fs, txn_id)?;
    let dir = dag::get_node(fs, &root_id, dir_path)?;
    Ok(dir.dir_entries()?.get(name).cloned())
}
