//! Repository directory structure
//!
//! A repository is a portable directory containing all state.
//! The layout is:
//!
//! ```text
//! repo/
//! └── db/
//!     ├── format               store format number
//!     ├── uuid                 repository uuid
//!     ├── current              "<youngest> <next-node-id> <next-copy-id>"
//!     ├── txn-current          next transaction key
//!     ├── write-lock           advisory exclusive lock file
//!     ├── revs/<N>             immutable revision content files
//!     ├── revprops/<N>         mutable revision property files
//!     └── transactions/<id>.txn/
//!         ├── rec              transaction record
//!         ├── props            transaction properties
//!         ├── changes          ordered path-change log
//!         └── node.<nid>.<cid> transaction-resident node records
//! ```

use std::path::{Path, PathBuf};
use tessera_core::{CopyId, NodeId, Revnum, TxnId};

/// Suffix of a transaction directory
const TXN_DIR_SUFFIX: &str = ".txn";

/// Repository directory paths
///
/// Provides access to all paths within a repository directory.
#[derive(Debug, Clone)]
pub struct RepoPaths {
    /// Root repository directory
    root: PathBuf,
}

impl RepoPaths {
    /// Create paths from a root directory
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        RepoPaths {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root repository directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the db directory
    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    /// Get the format file path
    pub fn format_file(&self) -> PathBuf {
        self.db_dir().join("format")
    }

    /// Get the uuid file path
    pub fn uuid_file(&self) -> PathBuf {
        self.db_dir().join("uuid")
    }

    /// Get the current file path
    pub fn current_file(&self) -> PathBuf {
        self.db_dir().join("current")
    }

    /// Get the txn-current file path
    pub fn txn_current_file(&self) -> PathBuf {
        self.db_dir().join("txn-current")
    }

    /// Get the write-lock file path
    pub fn write_lock_file(&self) -> PathBuf {
        self.db_dir().join("write-lock")
    }

    /// Get the revision files directory
    pub fn revs_dir(&self) -> PathBuf {
        self.db_dir().join("revs")
    }

    /// Get the revision property files directory
    pub fn revprops_dir(&self) -> PathBuf {
        self.db_dir().join("revprops")
    }

    /// Get the transactions directory
    pub fn txns_dir(&self) -> PathBuf {
        self.db_dir().join("transactions")
    }

    /// Get the content file of revision `rev`
    pub fn rev_file(&self, rev: Revnum) -> PathBuf {
        self.revs_dir().join(rev.to_string())
    }

    /// Get the property file of revision `rev`
    pub fn revprops_file(&self, rev: Revnum) -> PathBuf {
        self.revprops_dir().join(rev.to_string())
    }

    /// Get the directory of transaction `txn_id`
    pub fn txn_dir(&self, txn_id: &TxnId) -> PathBuf {
        self.txns_dir().join(format!("{}{}", txn_id, TXN_DIR_SUFFIX))
    }

    /// Get the record file of transaction `txn_id`
    pub fn txn_rec_file(&self, txn_id: &TxnId) -> PathBuf {
        self.txn_dir(txn_id).join("rec")
    }

    /// Get the property file of transaction `txn_id`
    pub fn txn_props_file(&self, txn_id: &TxnId) -> PathBuf {
        self.txn_dir(txn_id).join("props")
    }

    /// Get the change-log file of transaction `txn_id`
    pub fn txn_changes_file(&self, txn_id: &TxnId) -> PathBuf {
        self.txn_dir(txn_id).join("changes")
    }

    /// Get a transaction-resident node record file
    pub fn txn_node_file(&self, txn_id: &TxnId, node_id: &NodeId, copy_id: &CopyId) -> PathBuf {
        self.txn_dir(txn_id)
            .join(format!("node.{}.{}", node_id, copy_id))
    }

    /// Parse a transaction id back out of a directory name
    pub fn txn_id_from_dir_name(name: &str) -> Option<TxnId> {
        name.strip_suffix(TXN_DIR_SUFFIX).map(TxnId::from)
    }

    /// Check if a repository exists at this path
    ///
    /// A repository exists if the format file is present.
    pub fn exists(&self) -> bool {
        self.format_file().exists()
    }

    /// Create the full directory structure
    pub fn create_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.db_dir())?;
        std::fs::create_dir_all(self.revs_dir())?;
        std::fs::create_dir_all(self.revprops_dir())?;
        std::fs::create_dir_all(self.txns_dir())?;
        Ok(())
    }

    /// Validate that all required files and directories exist
    pub fn validate(&self) -> Result<(), RepoPathError> {
        if !self.root.exists() {
            return Err(RepoPathError::NotFound {
                path: self.root.clone(),
            });
        }
        if !self.format_file().exists() {
            return Err(RepoPathError::MissingFormat {
                path: self.format_file(),
            });
        }
        if !self.current_file().exists() {
            return Err(RepoPathError::MissingCurrent {
                path: self.current_file(),
            });
        }
        if !self.revs_dir().exists() || !self.revprops_dir().exists() || !self.txns_dir().exists()
        {
            return Err(RepoPathError::MissingDbDirs {
                path: self.db_dir(),
            });
        }
        Ok(())
    }
}

/// Repository path validation errors
#[derive(Debug, thiserror::Error)]
pub enum RepoPathError {
    /// Repository not found at path
    #[error("repository not found at {path}")]
    NotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// Missing format file
    #[error("missing format file at {path}")]
    MissingFormat {
        /// Expected format file path
        path: PathBuf,
    },

    /// Missing current file
    #[error("missing current file at {path}")]
    MissingCurrent {
        /// Expected current file path
        path: PathBuf,
    },

    /// Missing one of the db subdirectories
    #[error("missing db subdirectories under {path}")]
    MissingDbDirs {
        /// The db directory
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_from_root() {
        let paths = RepoPaths::from_root("/tmp/repo");

        assert_eq!(paths.root(), Path::new("/tmp/repo"));
        assert_eq!(paths.current_file(), PathBuf::from("/tmp/repo/db/current"));
        assert_eq!(paths.rev_file(7), PathBuf::from("/tmp/repo/db/revs/7"));
        assert_eq!(
            paths.revprops_file(7),
            PathBuf::from("/tmp/repo/db/revprops/7")
        );
        assert_eq!(
            paths.txn_dir(&TxnId::from("3")),
            PathBuf::from("/tmp/repo/db/transactions/3.txn")
        );
        assert_eq!(
            paths.txn_node_file(&TxnId::from("3"), &NodeId::from("a"), &CopyId::from("0")),
            PathBuf::from("/tmp/repo/db/transactions/3.txn/node.a.0")
        );
    }

    #[test]
    fn test_txn_id_from_dir_name() {
        assert_eq!(
            RepoPaths::txn_id_from_dir_name("3.txn"),
            Some(TxnId::from("3"))
        );
        assert_eq!(RepoPaths::txn_id_from_dir_name("3"), None);
    }

    #[test]
    fn test_create_and_validate() {
        let dir = tempdir().unwrap();
        let paths = RepoPaths::from_root(dir.path().join("repo"));

        assert!(!paths.exists());
        assert!(matches!(
            paths.validate(),
            Err(RepoPathError::NotFound { .. })
        ));

        paths.create_directories().unwrap();
        assert!(matches!(
            paths.validate(),
            Err(RepoPathError::MissingFormat { .. })
        ));

        std::fs::write(paths.format_file(), b"1\n").unwrap();
        assert!(matches!(
            paths.validate(),
            Err(RepoPathError::MissingCurrent { .. })
        ));

        std::fs::write(paths.current_file(), b"0 1 1\n").unwrap();
        assert!(paths.validate().is_ok());
        assert!(paths.exists());
    }
}
