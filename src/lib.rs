//! # Tessera
//!
//! A transactional, versioned filesystem with a working-copy status
//! driver. The repository persists a linear history of immutable
//! revisions; transactions expose a mutable copy-on-write tree over a
//! frozen base revision and promote to a new revision atomically at
//! commit.
//!
//! # Quick Start
//!
//! ```no_run
//! use tessera::{Filesystem, TxnOps};
//!
//! fn main() -> tessera::Result<()> {
//!     let fs = Filesystem::create("./my-repo")?;
//!
//!     // Mutate a transaction tree, then commit.
//!     let txn = fs.begin_txn(0)?;
//!     let root = txn.root()?;
//!     root.make_dir("trunk")?;
//!     root.make_file("trunk/README")?;
//!     root.set_file_contents("trunk/README", "hello")?;
//!     let rev = txn.commit()?;
//!
//!     // History is immutable and cheap to read.
//!     let head = fs.revision_root(rev)?;
//!     assert_eq!(head.file_contents("trunk/README")?, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `tessera-core`  | ids, errors, properties, caller context |
//! | `tessera-store` | on-disk layout, codecs, counters, locks |
//! | `tessera-fs`    | DAG, tree roots, transactions, commit |
//! | `tessera-wc`    | working copy, reporter/editor, status |
//!
//! Commit and revision-property writes serialize on an advisory
//! cross-process file lock; readers never block. The working-copy
//! [`status`] driver compares a checkout against repository HEAD
//! through the [`RaSession`] abstraction ([`LocalSession`] serves
//! `file://` URLs directly).

pub use tessera_core::{
    AuthProvider, CancelProbe, Config, Context, Error, NodeKind, PropMap, Result, Revnum, TxnId,
    PROP_REVISION_AUTHOR, PROP_REVISION_DATE, PROP_REVISION_LOG,
};
pub use tessera_fs::{Filesystem, Root, Transaction, TxnOps};
pub use tessera_wc::{
    checkout, status, Editor, LocalSession, RaSession, Reporter, Status, StatusFlags, StatusKind,
};
