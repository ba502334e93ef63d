//! Node revision persistence
//!
//! Transaction-resident nodes live as one file per node under the
//! transaction directory and are rewritten in place (atomically) as
//! the transaction mutates its tree. Revision-resident nodes are
//! parsed out of revision file bytes at a known offset and are never
//! written through this module; the commit path serializes them once.

use crate::atomic::write_atomic;
use crate::node_rev::NodeRevision;
use crate::paths::RepoPaths;
use tessera_core::{Error, NodeRevisionId, Origin, Result, Revnum};

/// Read a transaction-resident node record
pub fn read_txn_node(paths: &RepoPaths, id: &NodeRevisionId) -> Result<NodeRevision> {
    let txn_id = match &id.origin {
        Origin::Transaction { txn_id } => txn_id,
        Origin::Revision { .. } => {
            return Err(Error::CorruptStore {
                details: format!("node '{}' is not transaction-resident", id),
            })
        }
    };

    let path = paths.txn_node_file(txn_id, &id.node_id, &id.copy_id);
    let bytes = std::fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::CorruptStore {
                details: format!("missing node record for '{}'", id),
            }
        } else {
            e.into()
        }
    })?;

    let node = NodeRevision::from_bytes(&bytes)?;
    if node.id != *id {
        return Err(Error::CorruptStore {
            details: format!("node record '{}' claims id '{}'", id, node.id),
        });
    }
    Ok(node)
}

/// Write a transaction-resident node record
///
/// The node's id must be transaction-resident; committed nodes are
/// immutable and never pass through here.
pub fn write_txn_node(paths: &RepoPaths, node: &NodeRevision) -> Result<()> {
    let txn_id = match &node.id.origin {
        Origin::Transaction { txn_id } => txn_id,
        Origin::Revision { .. } => {
            return Err(Error::CorruptStore {
                details: format!("refusing to write committed node '{}'", node.id),
            })
        }
    };

    let path = paths.txn_node_file(txn_id, &node.id.node_id, &node.id.copy_id);
    write_atomic(&path, &node.to_bytes())?;
    Ok(())
}

/// Parse a revision-resident node record at a byte offset
///
/// `bytes` is the full content of the revision file for `rev`.
pub fn parse_rev_node_at(bytes: &[u8], rev: Revnum, offset: u64) -> Result<NodeRevision> {
    let offset = offset as usize;
    let slice = bytes.get(offset..).ok_or_else(|| Error::CorruptRevision {
        rev,
        details: format!("node offset {} beyond end of file", offset),
    })?;

    let (node, _) = NodeRevision::parse_prefix(slice).map_err(|e| Error::CorruptRevision {
        rev,
        details: e.to_string(),
    })?;

    let expected = Origin::Revision {
        rev,
        offset: offset as u64,
    };
    if node.id.origin != expected {
        return Err(Error::CorruptRevision {
            rev,
            details: format!("node at offset {} claims id '{}'", offset, node.id),
        });
    }
    Ok(node)
}
