//! Tree layer
//!
//! A [`Root`] presents a transaction or a committed revision as a
//! mounted tree and translates path operations into DAG operations.
//! Revision roots are immutable: every mutating operation checks the
//! root kind first and fails with `NotMutableRoot` on a revision root,
//! before any other validation.

use crate::dag;
use crate::fs::Filesystem;
use tessera_core::{
    set_prop, Error, NodeKind, NodeRevisionId, PropMap, Result, Revnum, TxnId,
};
use tessera_store::DirEntries;

#[derive(Debug, Clone)]
enum RootKind {
    Revision(Revnum),
    Transaction(TxnId),
}

/// A mounted tree view: either a frozen revision or a mutable
/// transaction workspace
pub struct Root<'fs> {
    fs: &'fs Filesystem,
    kind: RootKind,
}

impl<'fs> Root<'fs> {
    pub(crate) fn for_revision(fs: &'fs Filesystem, rev: Revnum) -> Self {
        Root {
            fs,
            kind: RootKind::Revision(rev),
        }
    }

    pub(crate) fn for_txn(fs: &'fs Filesystem, txn_id: TxnId) -> Self {
        Root {
            fs,
            kind: RootKind::Transaction(txn_id),
        }
    }

    /// True for transaction roots
    pub fn is_mutable(&self) -> bool {
        matches!(self.kind, RootKind::Transaction(_))
    }

    /// The mounted revision, for revision roots
    pub fn revision(&self) -> Option<Revnum> {
        match &self.kind {
            RootKind::Revision(rev) => Some(*rev),
            RootKind::Transaction(_) => None,
        }
    }

    /// The mounted transaction, for transaction roots
    pub fn txn_id(&self) -> Option<&TxnId> {
        match &self.kind {
            RootKind::Transaction(txn_id) => Some(txn_id),
            RootKind::Revision(_) => None,
        }
    }

    fn root_id(&self) -> Result<NodeRevisionId> {
        match &self.kind {
            RootKind::Revision(rev) => self.fs.revision_root_id(*rev),
            RootKind::Transaction(txn_id) => dag::txn_root_id(self.fs, txn_id),
        }
    }

    fn mutable_txn(&self) -> Result<&TxnId> {
        match &self.kind {
            RootKind::Transaction(txn_id) => Ok(txn_id),
            RootKind::Revision(_) => Err(Error::NotMutableRoot),
        }
    }

    // === Reads ===

    /// Kind of the node at `path`, or None if nothing is there
    pub fn check_path(&self, path: &str) -> Result<Option<NodeKind>> {
        dag::check_path(self.fs, &self.root_id()?, path)
    }

    /// Kind of the node at `path`
    pub fn node_kind(&self, path: &str) -> Result<NodeKind> {
        Ok(dag::get_node(self.fs, &self.root_id()?, path)?.kind())
    }

    /// Node-revision id at `path`
    pub fn node_id(&self, path: &str) -> Result<NodeRevisionId> {
        Ok(dag::get_node(self.fs, &self.root_id()?, path)?.id)
    }

    /// Byte contents of the file at `path`
    pub fn file_contents(&self, path: &str) -> Result<Vec<u8>> {
        let node = dag::get_node(self.fs, &self.root_id()?, path)?;
        match node.file_contents() {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(_) => Err(Error::NotFile {
                path: path.to_string(),
            }),
        }
    }

    /// Entries of the directory at `path`, ordered by name
    pub fn dir_entries(&self, path: &str) -> Result<DirEntries> {
        let node = dag::get_node(self.fs, &self.root_id()?, path)?;
        match node.dir_entries() {
            Ok(entries) => Ok(entries.clone()),
            Err(_) => Err(Error::NotDirectory {
                path: path.to_string(),
            }),
        }
    }

    /// Property map of the node at `path`
    pub fn node_proplist(&self, path: &str) -> Result<PropMap> {
        Ok(dag::get_node(self.fs, &self.root_id()?, path)?.props)
    }

    /// One node property, or None if unset
    pub fn node_prop(&self, path: &str, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.node_proplist(path)?.remove(name))
    }

    // === Mutations ===

    /// Create an empty file at `path`
    pub fn make_file(&self, path: &str) -> Result<()> {
        let txn_id = self.mutable_txn()?.clone();
        dag::make_node(self.fs, &txn_id, path, NodeKind::File).map(|_| ())
    }

    /// Create an empty directory at `path`
    pub fn make_dir(&self, path: &str) -> Result<()> {
        let txn_id = self.mutable_txn()?.clone();
        dag::make_node(self.fs, &txn_id, path, NodeKind::Directory).map(|_| ())
    }

    /// Remove the entry at `path`
    pub fn delete(&self, path: &str) -> Result<()> {
        let txn_id = self.mutable_txn()?.clone();
        dag::delete_entry(self.fs, &txn_id, path)
    }

    /// Replace the contents of the file at `path`
    pub fn set_file_contents(&self, path: &str, contents: impl Into<Vec<u8>>) -> Result<()> {
        let txn_id = self.mutable_txn()?.clone();
        dag::set_contents(self.fs, &txn_id, path, contents.into())
    }

    /// Change one property of the node at `path`
    ///
    /// A `None` value removes the property.
    pub fn change_node_prop(&self, path: &str, name: &str, value: Option<&[u8]>) -> Result<()> {
        let txn_id = self.mutable_txn()?.clone();
        let mut props = self.node_proplist(path)?;
        set_prop(&mut props, name, value);
        dag::set_node_props(self.fs, &txn_id, path, props)
    }
}

impl std::fmt::Debug for Root<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            RootKind::Revision(rev) => write!(f, "Root(r{})", rev),
            RootKind::Transaction(txn_id) => write!(f, "Root(t{})", txn_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TxnOps;
    use tempfile::tempdir;

    fn test_fs() -> (tempfile::TempDir, Filesystem) {
        let dir = tempdir().unwrap();
        let fs = Filesystem::create(dir.path().join("repo")).unwrap();
        (dir, fs)
    }

    #[test]
    fn test_revision_root_rejects_mutation() {
        let (_dir, fs) = test_fs();
        let root = fs.revision_root(0).unwrap();

        assert!(!root.is_mutable());
        assert!(matches!(root.make_file("a"), Err(Error::NotMutableRoot)));
        assert!(matches!(root.make_dir("d"), Err(Error::NotMutableRoot)));
        assert!(matches!(root.delete("a"), Err(Error::NotMutableRoot)));
        assert!(matches!(
            root.set_file_contents("a", "x"),
            Err(Error::NotMutableRoot)
        ));
        assert!(matches!(
            root.change_node_prop("", "p", Some(b"v")),
            Err(Error::NotMutableRoot)
        ));
    }

    #[test]
    fn test_txn_root_basic_tree_building() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();

        root.make_dir("dir").unwrap();
        root.make_file("dir/file").unwrap();
        root.set_file_contents("dir/file", "payload").unwrap();

        assert_eq!(root.node_kind("dir").unwrap(), NodeKind::Directory);
        assert_eq!(root.node_kind("dir/file").unwrap(), NodeKind::File);
        assert_eq!(root.file_contents("dir/file").unwrap(), b"payload");
        assert_eq!(root.check_path("absent").unwrap(), None);

        let entries = root.dir_entries("").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("dir"));
    }

    #[test]
    fn test_make_file_collision() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();

        root.make_file("a").unwrap();
        assert!(matches!(
            root.make_file("a"),
            Err(Error::AlreadyExists { .. })
        ));
        assert!(matches!(
            root.make_dir("a"),
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_delete_and_missing_paths() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();

        root.make_file("a").unwrap();
        root.delete("a").unwrap();
        assert_eq!(root.check_path("a").unwrap(), None);

        assert!(matches!(
            root.delete("a"),
            Err(Error::PathNotFound { .. })
        ));
        assert!(matches!(root.delete("/"), Err(Error::RootDirectory)));
    }

    #[test]
    fn test_file_is_not_directory() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();

        root.make_file("f").unwrap();
        assert!(matches!(
            root.make_file("f/child"),
            Err(Error::NotDirectory { .. })
        ));
        assert!(matches!(
            root.dir_entries("f"),
            Err(Error::NotDirectory { .. })
        ));
        assert!(matches!(
            root.file_contents(""),
            Err(Error::NotFile { .. })
        ));
    }

    #[test]
    fn test_node_props() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();

        root.make_file("f").unwrap();
        root.change_node_prop("f", "tsr:mime", Some(b"text/plain"))
            .unwrap();
        assert_eq!(
            root.node_prop("f", "tsr:mime").unwrap(),
            Some(b"text/plain".to_vec())
        );

        root.change_node_prop("f", "tsr:mime", None).unwrap();
        assert_eq!(root.node_prop("f", "tsr:mime").unwrap(), None);
    }

    #[test]
    fn test_open_node_is_idempotent() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();
        root.make_file("a").unwrap();

        let first = root.node_id("a").unwrap();
        let second = root.node_id("a").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_copy_on_write_leaves_base_untouched() {
        let (_dir, fs) = test_fs();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();

        root.make_file("a").unwrap();

        // Revision 0 still shows an empty tree.
        let rev_root = fs.revision_root(0).unwrap();
        assert_eq!(rev_root.check_path("a").unwrap(), None);
        assert!(rev_root.dir_entries("").unwrap().is_empty());
    }
}
