//! Error types for the Tessera filesystem and working-copy layers
//!
//! All public operations return [`Result`], built on a single [`Error`]
//! enum. Errors may be wrapped with contextual messages via
//! [`Error::Context`]; the underlying chain is preserved through
//! `#[source]` so callers can walk it with `std::error::Error::source`.
//!
//! ## Error Categories
//!
//! - **Lookup**: the referenced revision, transaction, or path does not
//!   exist (`NoSuchRevision`, `NoSuchTransaction`, `PathNotFound`, ...)
//! - **Lifecycle**: an operation was attempted against an object in the
//!   wrong state (`TransactionNotMutable`, `TxnOutOfDate`, ...)
//! - **Tree**: a path operation violated the tree schema
//!   (`AlreadyExists`, `NotDirectory`, `NotFile`)
//! - **Working copy**: metadata defects in the administrative area
//!   (`EntryNotFound`, `EntryMissingUrl`)
//! - **Persistence**: on-disk corruption (`CorruptRevision`,
//!   `CorruptHashFile`) and I/O failures (`Io`)

use crate::id::{Revnum, TxnId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Tessera operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all Tessera operations
#[derive(Debug, Error)]
pub enum Error {
    /// The referenced revision does not exist (greater than youngest)
    #[error("no such revision {rev}")]
    NoSuchRevision {
        /// Revision that was requested
        rev: Revnum,
    },

    /// The referenced transaction does not exist
    #[error("no such transaction '{txn_id}'")]
    NoSuchTransaction {
        /// Transaction id that was requested
        txn_id: TxnId,
    },

    /// Attempted to mutate a transaction that is not in the normal state
    #[error("cannot modify transaction '{txn_id}': not mutable")]
    TransactionNotMutable {
        /// The offending transaction
        txn_id: TxnId,
    },

    /// A destructive operation expected a dead transaction
    #[error("transaction is not dead: '{txn_id}'")]
    TransactionNotDead {
        /// The offending transaction
        txn_id: TxnId,
    },

    /// An operation expected a live transaction
    #[error("transaction is dead: '{txn_id}'")]
    TransactionDead {
        /// The offending transaction
        txn_id: TxnId,
    },

    /// The transaction base is out of date with respect to HEAD
    ///
    /// Raised at commit time when another transaction committed a
    /// conflicting change first.
    #[error("transaction '{txn_id}' out of date: conflict at '{path}'")]
    TxnOutOfDate {
        /// The losing transaction
        txn_id: TxnId,
        /// First conflicting path discovered by the merge
        path: String,
    },

    /// A path component does not exist in the tree
    #[error("path not found: '{path}'")]
    PathNotFound {
        /// The missing path
        path: String,
    },

    /// A new entry collides with an existing one
    #[error("path already exists: '{path}'")]
    AlreadyExists {
        /// The colliding path
        path: String,
    },

    /// A file node was used where a directory was required
    #[error("not a directory: '{path}'")]
    NotDirectory {
        /// The offending path
        path: String,
    },

    /// A directory node was used where a file was required
    #[error("not a file: '{path}'")]
    NotFile {
        /// The offending path
        path: String,
    },

    /// A mutating tree operation was issued against a revision root
    #[error("root is not mutable")]
    NotMutableRoot,

    /// The tree's root directory cannot be deleted
    #[error("the root directory cannot be deleted")]
    RootDirectory,

    /// The working-copy target is not under version control
    #[error("'{path}' is not under version control")]
    EntryNotFound {
        /// The unversioned path
        path: PathBuf,
    },

    /// A versioned entry is missing its recorded repository URL
    #[error("entry '{path}' has no URL")]
    EntryMissingUrl {
        /// The defective entry's path
        path: PathBuf,
    },

    /// The working-copy administrative area is locked by another process
    #[error("working copy '{path}' is locked")]
    WorkingCopyLocked {
        /// The locked directory
        path: PathBuf,
    },

    /// A revision file failed validation while being read
    #[error("corrupt revision {rev}: {details}")]
    CorruptRevision {
        /// The unreadable revision
        rev: Revnum,
        /// What failed to parse
        details: String,
    },

    /// A hash-file stream failed validation while being read
    #[error("corrupt hash file: {details}")]
    CorruptHashFile {
        /// What failed to parse
        details: String,
    },

    /// A store bookkeeping file (`current`, `txn-current`, `format`)
    /// failed validation while being read
    #[error("corrupt store: {details}")]
    CorruptStore {
        /// What failed to parse
        details: String,
    },

    /// The caller's cancellation probe requested an unwind
    #[error("operation canceled")]
    Canceled,

    /// Purging a transaction failed after it was marked dead
    #[error("transaction cleanup failed for '{txn_id}'")]
    TransactionCleanupFailed {
        /// The transaction whose on-disk footprint survived
        txn_id: TxnId,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// I/O error from the underlying platform
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A contextual message wrapped around another error
    #[error("{message}")]
    Context {
        /// Context message describing the failing operation
        message: String,
        /// The wrapped cause
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with a contextual message, preserving the chain
    pub fn context(self, message: impl Into<String>) -> Self {
        Error::Context {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Unwrap context layers down to the root error kind
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if this is a "not found" lookup failure
    ///
    /// Returns true for: `NoSuchRevision`, `NoSuchTransaction`,
    /// `PathNotFound`, `EntryNotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::NoSuchRevision { .. }
                | Error::NoSuchTransaction { .. }
                | Error::PathNotFound { .. }
                | Error::EntryNotFound { .. }
        )
    }

    /// Check if this is a commit conflict
    ///
    /// Out-of-date transactions can be retried after rebasing against
    /// the new HEAD; nothing else in this enum is retryable.
    pub fn is_out_of_date(&self) -> bool {
        matches!(self.root_cause(), Error::TxnOutOfDate { .. })
    }

    /// Check if this error indicates on-disk corruption
    ///
    /// Corruption is fatal to the current operation but never to the
    /// process.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::CorruptRevision { .. }
                | Error::CorruptHashFile { .. }
                | Error::CorruptStore { .. }
        )
    }

    /// Check if this is a user-requested cancellation
    pub fn is_canceled(&self) -> bool {
        matches!(self.root_cause(), Error::Canceled)
    }
}

/// Extension trait adding `.with_context(...)` to results
pub trait ResultExt<T> {
    /// Wrap the error side with a contextual message
    fn with_context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}
