//! Working-copy state reporter interface
//!
//! The reporter is the client-to-server half of a delta drive: the
//! client describes what it already has (the base revision of the
//! whole tree, per-path revisions where they differ, locally missing
//! paths, switched subtrees), then calls `finish_report`, which
//! synchronously drives the paired editor on the calling thread.

use tessera_core::{Result, Revnum};

/// Streaming producer of working-copy state assertions
pub trait Reporter {
    /// Assert that `path` is at `rev`
    ///
    /// The empty path sets the base revision of the whole reported
    /// tree and must come first. `start_empty` asserts the directory
    /// should be treated as having no entries yet.
    fn set_path(&mut self, path: &str, rev: Revnum, start_empty: bool) -> Result<()>;

    /// Assert that the client does not have `path`
    fn delete_path(&mut self, path: &str) -> Result<()>;

    /// Assert that `path` tracks a different repository location
    fn link_path(&mut self, path: &str, url: &str, rev: Revnum) -> Result<()>;

    /// Finish the report and drive the paired editor to completion
    fn finish_report(self: Box<Self>) -> Result<()>;

    /// Abandon the report; the paired editor sees `abort_edit`
    fn abort_report(self: Box<Self>) -> Result<()>;
}
