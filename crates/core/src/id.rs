//! Identifiers for revisions, transactions, and node revisions
//!
//! A node-revision id is the triple `{node-id, copy-id, origin}` with
//! the text syntax:
//!
//! ```text
//! <node-id>.<copy-id>.r<revnum>/<offset>     revision-resident
//! <node-id>.<copy-id>.t<txn-id>              transaction-resident
//! ```
//!
//! Node-ids and copy-ids are opaque base-36 keys handed out by the key
//! generator. Two node-revision ids designate the same line of history
//! iff their node-ids agree; the origin says where the record physically
//! lives (a byte offset in a revision file, or a file in a transaction
//! directory).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Revision number. Revisions are dense from 0; revision 0 is the empty
/// root created when the repository is initialized.
pub type Revnum = u64;

/// Opaque identifier for a line of node history
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

/// Opaque identifier for a copy lineage
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CopyId(String);

/// Opaque identifier for a transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(String);

macro_rules! opaque_key {
    ($name:ident) => {
        impl $name {
            /// View the key as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_key!(NodeId);
opaque_key!(CopyId);
opaque_key!(TxnId);

/// Where a node revision physically lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Resident in a committed revision file at a byte offset
    Revision {
        /// Revision whose file holds the record
        rev: Revnum,
        /// Byte offset of the record within the revision file
        offset: u64,
    },
    /// Resident in an in-progress transaction directory
    Transaction {
        /// Owning transaction
        txn_id: TxnId,
    },
}

/// Identifier of one immutable node revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRevisionId {
    /// Line-of-history identifier
    pub node_id: NodeId,
    /// Copy lineage identifier
    pub copy_id: CopyId,
    /// Physical location of the record
    pub origin: Origin,
}

impl NodeRevisionId {
    /// Construct a transaction-resident id
    pub fn in_txn(node_id: NodeId, copy_id: CopyId, txn_id: TxnId) -> Self {
        NodeRevisionId {
            node_id,
            copy_id,
            origin: Origin::Transaction { txn_id },
        }
    }

    /// Construct a revision-resident id
    pub fn in_revision(node_id: NodeId, copy_id: CopyId, rev: Revnum, offset: u64) -> Self {
        NodeRevisionId {
            node_id,
            copy_id,
            origin: Origin::Revision { rev, offset },
        }
    }

    /// Check whether two ids designate the same line of history
    ///
    /// Only the node-id participates; copy-id and origin are ignored.
    pub fn same_line_of_history(&self, other: &NodeRevisionId) -> bool {
        self.node_id == other.node_id
    }

    /// The owning transaction, if this id is transaction-resident
    pub fn txn_id(&self) -> Option<&TxnId> {
        match &self.origin {
            Origin::Transaction { txn_id } => Some(txn_id),
            Origin::Revision { .. } => None,
        }
    }

    /// Check whether this id is mutable within the given transaction
    ///
    /// A node revision may only be written through the transaction that
    /// created it; everything else is frozen history.
    pub fn is_mutable_in(&self, txn_id: &TxnId) -> bool {
        self.txn_id() == Some(txn_id)
    }

    /// Parse the text syntax
    ///
    /// Returns None on any malformed input; callers translate that into
    /// a corruption error naming the file being read.
    pub fn from_string(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '.');
        let node = parts.next()?;
        let copy = parts.next()?;
        let origin = parts.next()?;
        if node.is_empty() || copy.is_empty() || origin.is_empty() {
            return None;
        }

        let origin = match origin.as_bytes()[0] {
            b'r' => {
                let (rev, offset) = origin[1..].split_once('/')?;
                Origin::Revision {
                    rev: rev.parse().ok()?,
                    offset: offset.parse().ok()?,
                }
            }
            b't' if origin.len() > 1 => Origin::Transaction {
                txn_id: TxnId::from(&origin[1..]),
            },
            _ => return None,
        };

        Some(NodeRevisionId {
            node_id: NodeId::from(node),
            copy_id: CopyId::from(copy),
            origin,
        })
    }
}

impl fmt::Display for NodeRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.", self.node_id, self.copy_id)?;
        match &self.origin {
            Origin::Revision { rev, offset } => write!(f, "r{}/{}", rev, offset),
            Origin::Transaction { txn_id } => write!(f, "t{}", txn_id),
        }
    }
}
