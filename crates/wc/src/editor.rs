//! Tree-delta editor interface
//!
//! The editor is the server-to-client half of a delta drive: a
//! streaming callback interface describing "what has changed" as a
//! depth-first walk. The contract: the driver opens the root once,
//! opens or adds each touched path at most once, describes file
//! content changes with `apply_textdelta` (byte-level delta encoding
//! itself is a transport concern), and finishes with exactly one
//! `close_edit` or `abort_edit`.
//!
//! Paths are relative to the edit root and use `/` separators.

use tessera_core::{Result, Revnum};

/// Streaming consumer of a tree delta
pub trait Editor {
    /// Revision the drive is bringing the client up to
    fn set_target_revision(&mut self, rev: Revnum) -> Result<()>;

    /// Begin the drive at the edit root
    fn open_root(&mut self, base_rev: Option<Revnum>) -> Result<()>;

    /// `path` no longer exists on the server side
    fn delete_entry(&mut self, path: &str, rev: Option<Revnum>) -> Result<()>;

    /// A directory the client does not have yet
    fn add_directory(&mut self, path: &str) -> Result<()>;

    /// Descend into a directory both sides have
    fn open_directory(&mut self, path: &str, base_rev: Option<Revnum>) -> Result<()>;

    /// Change one property of an open directory
    fn change_dir_prop(&mut self, _path: &str, _name: &str, _value: Option<&[u8]>) -> Result<()> {
        Ok(())
    }

    /// Leave a directory opened with `open_directory`/`add_directory`
    fn close_directory(&mut self, path: &str) -> Result<()>;

    /// A file the client does not have yet
    fn add_file(&mut self, path: &str) -> Result<()>;

    /// Touch a file both sides have
    fn open_file(&mut self, path: &str, base_rev: Option<Revnum>) -> Result<()>;

    /// The file's contents differ; the delta itself is opaque here
    fn apply_textdelta(&mut self, path: &str) -> Result<()>;

    /// Change one property of an open file
    fn change_file_prop(&mut self, _path: &str, _name: &str, _value: Option<&[u8]>) -> Result<()> {
        Ok(())
    }

    /// Leave a file opened with `open_file`/`add_file`
    fn close_file(&mut self, path: &str) -> Result<()>;

    /// The drive completed; the consumer may now act on what it saw
    fn close_edit(&mut self) -> Result<()>;

    /// The drive failed mid-way; discard partial state
    fn abort_edit(&mut self) -> Result<()> {
        Ok(())
    }
}
