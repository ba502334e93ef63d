//! Tessera filesystem backend
//!
//! The transactional core: a linear history of immutable revisions, a
//! store of in-flight transactions, and copy-on-write trees mounted
//! over both. Persistence primitives come from `tessera-store`;
//! everything here is policy: the DAG, the tree façade, the merge,
//! and the commit protocol.

mod commit;
mod dag;
mod merge;
pub mod path;

pub mod fs;
pub mod tree;
pub mod txn;

pub use fs::{Filesystem, FORMAT_NUMBER};
pub use tree::Root;
pub use txn::{Transaction, TxnOps};
