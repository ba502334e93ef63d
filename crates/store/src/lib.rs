//! On-disk persistence for the Tessera versioned filesystem
//!
//! This crate owns every byte under `<repo>/db/`: the directory
//! layout, the hash-file codec, counter files, the advisory write
//! lock, and the node / revision / transaction record formats. Policy
//! (copy-on-write, merging, commit ordering) lives above in
//! `tessera-fs`; nothing here interprets trees.

pub mod atomic;
pub mod changes;
pub mod current;
pub mod hashfile;
pub mod keys;
pub mod lock;
pub mod node_rev;
pub mod node_store;
pub mod paths;
pub mod rev_store;
pub mod txn_store;

pub use changes::{ChangeAction, ChangedPath};
pub use current::Current;
pub use lock::WriteLock;
pub use node_rev::{DirEntries, DirEntry, NodeContent, NodeRevision};
pub use paths::RepoPaths;
pub use txn_store::{TransactionKind, TransactionRecord};
