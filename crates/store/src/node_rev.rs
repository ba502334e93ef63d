//! Node revision records
//!
//! A node revision is one immutable version of a file or directory.
//! On disk it is a hash-file record with the keys:
//!
//! ```text
//! id         the node-revision id (self-describing at any offset)
//! kind       "file" | "dir"
//! pred       predecessor node-revision id (omitted for new nodes)
//! props      nested hash-file of node properties (omitted if empty)
//! contents   raw file bytes (files only, always present)
//! children   nested hash-file name -> "<kind> <id>" (dirs only,
//!            always present)
//! ```
//!
//! Once written under a revision a record is never modified; cloning
//! into a transaction produces a new record with a `pred` link.

use crate::hashfile;
use std::collections::BTreeMap;
use tessera_core::{set_prop, Error, NodeKind, NodeRevisionId, PropMap, Result};

/// One directory entry: name → child node revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Child node-revision id
    pub id: NodeRevisionId,
    /// Kind hint, always consistent with the child record
    pub kind: NodeKind,
}

/// Directory entry map, ordered by name
pub type DirEntries = BTreeMap<String, DirEntry>;

/// Payload of a node revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeContent {
    /// File byte contents
    File(Vec<u8>),
    /// Directory children
    Directory(DirEntries),
}

/// One immutable versioned node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRevision {
    /// This record's id
    pub id: NodeRevisionId,
    /// The node revision this one was cloned from, if any
    pub predecessor: Option<NodeRevisionId>,
    /// Node properties
    pub props: PropMap,
    /// File bytes or directory entries
    pub content: NodeContent,
}

impl NodeRevision {
    /// Create an empty file node
    pub fn new_file(id: NodeRevisionId) -> Self {
        NodeRevision {
            id,
            predecessor: None,
            props: PropMap::new(),
            content: NodeContent::File(Vec::new()),
        }
    }

    /// Create an empty directory node
    pub fn new_dir(id: NodeRevisionId) -> Self {
        NodeRevision {
            id,
            predecessor: None,
            props: PropMap::new(),
            content: NodeContent::Directory(DirEntries::new()),
        }
    }

    /// Kind of this node
    pub fn kind(&self) -> NodeKind {
        match self.content {
            NodeContent::File(_) => NodeKind::File,
            NodeContent::Directory(_) => NodeKind::Directory,
        }
    }

    /// Directory entries, or `NotDirectory` for files
    pub fn dir_entries(&self) -> Result<&DirEntries> {
        match &self.content {
            NodeContent::Directory(entries) => Ok(entries),
            NodeContent::File(_) => Err(Error::NotDirectory {
                path: self.id.to_string(),
            }),
        }
    }

    /// Mutable directory entries, or `NotDirectory` for files
    pub fn dir_entries_mut(&mut self) -> Result<&mut DirEntries> {
        match &mut self.content {
            NodeContent::Directory(entries) => Ok(entries),
            NodeContent::File(_) => Err(Error::NotDirectory {
                path: self.id.to_string(),
            }),
        }
    }

    /// File contents, or `NotFile` for directories
    pub fn file_contents(&self) -> Result<&[u8]> {
        match &self.content {
            NodeContent::File(bytes) => Ok(bytes),
            NodeContent::Directory(_) => Err(Error::NotFile {
                path: self.id.to_string(),
            }),
        }
    }

    /// Serialize to hash-file bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut record = PropMap::new();
        set_prop(&mut record, "id", Some(self.id.to_string().as_bytes()));
        set_prop(&mut record, "kind", Some(self.kind().as_str().as_bytes()));
        if let Some(pred) = &self.predecessor {
            set_prop(&mut record, "pred", Some(pred.to_string().as_bytes()));
        }
        if !self.props.is_empty() {
            set_prop(&mut record, "props", Some(&hashfile::to_bytes(&self.props)));
        }
        match &self.content {
            NodeContent::File(bytes) => {
                set_prop(&mut record, "contents", Some(bytes));
            }
            NodeContent::Directory(entries) => {
                let mut children = PropMap::new();
                for (name, entry) in entries {
                    let value = format!("{} {}", entry.kind.as_str(), entry.id);
                    children.insert(name.clone(), value.into_bytes());
                }
                set_prop(&mut record, "children", Some(&hashfile::to_bytes(&children)));
            }
        }
        hashfile::to_bytes(&record)
    }

    /// Parse a record from the front of `bytes`
    ///
    /// Returns the node and the number of bytes consumed, so records can
    /// be read at offsets inside a revision file.
    pub fn parse_prefix(bytes: &[u8]) -> Result<(NodeRevision, usize)> {
        let (record, consumed) = hashfile::parse_prefix(bytes)?;
        let node = Self::from_record(record)?;
        Ok((node, consumed))
    }

    /// Parse a record that must occupy the whole input
    pub fn from_bytes(bytes: &[u8]) -> Result<NodeRevision> {
        let record = hashfile::from_bytes(bytes)?;
        Self::from_record(record)
    }

    fn from_record(mut record: PropMap) -> Result<NodeRevision> {
        let id = take_id(&mut record, "id")?.ok_or_else(|| corrupt("missing id"))?;
        let predecessor = take_id(&mut record, "pred")?;

        let kind_bytes = record.remove("kind").ok_or_else(|| corrupt("missing kind"))?;
        let kind = std::str::from_utf8(&kind_bytes)
            .ok()
            .and_then(NodeKind::from_str_token)
            .ok_or_else(|| corrupt("unknown node kind"))?;

        let props = match record.remove("props") {
            Some(bytes) => hashfile::from_bytes(&bytes)?,
            None => PropMap::new(),
        };

        let content = match kind {
            NodeKind::File => {
                if record.contains_key("children") {
                    return Err(corrupt("file node with children"));
                }
                let bytes = record
                    .remove("contents")
                    .ok_or_else(|| corrupt("file node without contents"))?;
                NodeContent::File(bytes)
            }
            NodeKind::Directory => {
                if record.contains_key("contents") {
                    return Err(corrupt("directory node with contents"));
                }
                let bytes = record
                    .remove("children")
                    .ok_or_else(|| corrupt("directory node without children"))?;
                NodeContent::Directory(parse_children(&bytes)?)
            }
        };

        Ok(NodeRevision {
            id,
            predecessor,
            props,
            content,
        })
    }
}

fn parse_children(bytes: &[u8]) -> Result<DirEntries> {
    let raw = hashfile::from_bytes(bytes)?;
    let mut entries = DirEntries::new();
    for (name, value) in raw {
        if name.is_empty() || name.contains('/') {
            return Err(corrupt("illegal directory entry name"));
        }
        let value = std::str::from_utf8(&value).map_err(|_| corrupt("binary entry value"))?;
        let (kind, id) = value
            .split_once(' ')
            .ok_or_else(|| corrupt("malformed directory entry"))?;
        let kind =
            NodeKind::from_str_token(kind).ok_or_else(|| corrupt("unknown entry kind"))?;
        let id =
            NodeRevisionId::from_string(id).ok_or_else(|| corrupt("malformed entry id"))?;
        entries.insert(name, DirEntry { id, kind });
    }
    Ok(entries)
}

fn take_id(record: &mut PropMap, key: &str) -> Result<Option<NodeRevisionId>> {
    match record.remove(key) {
        None => Ok(None),
        Some(bytes) => {
            let s = std::str::from_utf8(&bytes).map_err(|_| corrupt("binary id"))?;
            NodeRevisionId::from_string(s)
                .map(Some)
                .ok_or_else(|| corrupt("malformed node-revision id"))
        }
    }
}

fn corrupt(details: &str) -> Error {
    Error::CorruptHashFile {
        details: format!("node record: {}", details),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn_id(s: &str) -> NodeRevisionId {
        NodeRevisionId::from_string(&format!("{}.0.t1", s)).unwrap()
    }

    #[test]
    fn test_file_round_trip() {
        let mut node = NodeRevision::new_file(txn_id("4"));
        node.predecessor = Some(NodeRevisionId::from_string("4.0.r2/100").unwrap());
        node.content = NodeContent::File(b"hello\nworld\x00".to_vec());
        node.props.insert("tsr:mime".to_string(), b"text/plain".to_vec());

        let parsed = NodeRevision::from_bytes(&node.to_bytes()).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn test_dir_round_trip() {
        let mut node = NodeRevision::new_dir(txn_id("0"));
        node.dir_entries_mut().unwrap().insert(
            "a".to_string(),
            DirEntry {
                id: NodeRevisionId::from_string("1.0.r3/0").unwrap(),
                kind: NodeKind::File,
            },
        );
        node.dir_entries_mut().unwrap().insert(
            "sub".to_string(),
            DirEntry {
                id: txn_id("2"),
                kind: NodeKind::Directory,
            },
        );

        let parsed = NodeRevision::from_bytes(&node.to_bytes()).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn test_empty_dir_round_trip() {
        let node = NodeRevision::new_dir(txn_id("0"));
        let parsed = NodeRevision::from_bytes(&node.to_bytes()).unwrap();
        assert_eq!(parsed.dir_entries().unwrap().len(), 0);
    }

    #[test]
    fn test_parse_prefix_consumes_one_record() {
        let first = NodeRevision::new_file(txn_id("1"));
        let second = NodeRevision::new_dir(txn_id("2"));

        let mut bytes = first.to_bytes();
        let first_len = bytes.len();
        bytes.extend_from_slice(&second.to_bytes());

        let (parsed, consumed) = NodeRevision::parse_prefix(&bytes).unwrap();
        assert_eq!(parsed, first);
        assert_eq!(consumed, first_len);

        let (parsed, _) = NodeRevision::parse_prefix(&bytes[consumed..]).unwrap();
        assert_eq!(parsed, second);
    }

    #[test]
    fn test_kind_accessors() {
        let file = NodeRevision::new_file(txn_id("1"));
        assert_eq!(file.kind(), NodeKind::File);
        assert!(file.dir_entries().is_err());
        assert!(file.file_contents().is_ok());

        let dir = NodeRevision::new_dir(txn_id("2"));
        assert_eq!(dir.kind(), NodeKind::Directory);
        assert!(dir.dir_entries().is_ok());
        assert!(dir.file_contents().is_err());
    }

    #[test]
    fn test_rejects_defective_records() {
        // Missing kind.
        let mut record = PropMap::new();
        record.insert("id".to_string(), b"1.0.t1".to_vec());
        assert!(NodeRevision::from_bytes(&hashfile::to_bytes(&record)).is_err());

        // File with children.
        let mut record = PropMap::new();
        record.insert("id".to_string(), b"1.0.t1".to_vec());
        record.insert("kind".to_string(), b"file".to_vec());
        record.insert("contents".to_string(), Vec::new());
        record.insert("children".to_string(), hashfile::to_bytes(&PropMap::new()));
        assert!(NodeRevision::from_bytes(&hashfile::to_bytes(&record)).is_err());
    }
}
