//! Core types for the Tessera versioned filesystem
//!
//! This crate defines the vocabulary shared by every layer:
//! identifiers, property maps, the caller context, and the error type.
//! It has no on-disk knowledge; persistence lives in `tessera-store`.

pub mod context;
pub mod error;
pub mod id;
pub mod props;

pub use context::{AuthProvider, CancelProbe, Config, Context};
pub use error::{Error, Result, ResultExt};
pub use id::{CopyId, NodeId, NodeRevisionId, Origin, Revnum, TxnId};
pub use props::{set_prop, PropMap, PROP_REVISION_AUTHOR, PROP_REVISION_DATE, PROP_REVISION_LOG};

/// Kind of a versioned node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    /// Regular file with byte contents
    File,
    /// Directory with named children
    Directory,
}

impl NodeKind {
    /// On-disk / wire token for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Directory => "dir",
        }
    }

    /// Parse the on-disk token
    pub fn from_str_token(s: &str) -> Option<Self> {
        match s {
            "file" => Some(NodeKind::File),
            "dir" => Some(NodeKind::Directory),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_tokens() {
        assert_eq!(NodeKind::File.as_str(), "file");
        assert_eq!(NodeKind::Directory.as_str(), "dir");
        assert_eq!(NodeKind::from_str_token("file"), Some(NodeKind::File));
        assert_eq!(NodeKind::from_str_token("dir"), Some(NodeKind::Directory));
        assert_eq!(NodeKind::from_str_token("symlink"), None);
    }
}
