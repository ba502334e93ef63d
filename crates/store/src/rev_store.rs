//! Revision persistence
//!
//! A revision file is immutable once published:
//!
//! ```text
//! db/revs/<N>:
//!   node record               (at ascending byte offsets)
//!   node record
//!   ...
//!   change log lines          (folded, one net change per path)
//!   <root-offset> <changes-offset>\n      trailer, last line
//! ```
//!
//! The trailer is the last line of the file; the root offset locates
//! the revision's root directory record, the changes offset the start
//! of the change-log section. Revision property files under
//! `db/revprops/<N>` are the only mutable companion state and are
//! replaced atomically under the write lock.

use crate::atomic::write_atomic;
use crate::changes::{self, ChangedPath};
use crate::hashfile;
use crate::node_store;
use crate::paths::RepoPaths;
use tessera_core::{Error, NodeRevisionId, PropMap, Result, Revnum};

/// Parsed trailer of a revision file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionTrailer {
    /// Byte offset of the root directory record
    pub root_offset: u64,
    /// Byte offset of the change-log section
    pub changes_offset: u64,
    /// Byte offset where the trailer line itself starts
    pub trailer_offset: u64,
}

/// Read the raw bytes of a revision file
///
/// The caller is responsible for checking the revision against the
/// youngest counter first; a missing file below youngest is corruption.
pub fn read_rev_file(paths: &RepoPaths, rev: Revnum) -> Result<Vec<u8>> {
    std::fs::read(paths.rev_file(rev)).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::CorruptRevision {
                rev,
                details: "revision file missing".to_string(),
            }
        } else {
            e.into()
        }
    })
}

/// Publish a revision file
///
/// Written via temp-and-rename: a crash between writing revision N+1
/// and bumping `current` leaves an orphan file that the next commit
/// replaces atomically.
pub fn write_rev_file(paths: &RepoPaths, rev: Revnum, bytes: &[u8]) -> Result<()> {
    write_atomic(&paths.rev_file(rev), bytes)?;
    Ok(())
}

/// Parse the trailer line of a revision file
pub fn parse_trailer(bytes: &[u8], rev: Revnum) -> Result<RevisionTrailer> {
    let corrupt = |details: &str| Error::CorruptRevision {
        rev,
        details: details.to_string(),
    };

    if bytes.last() != Some(&b'\n') {
        return Err(corrupt("missing trailer line"));
    }
    let body = &bytes[..bytes.len() - 1];
    let line_start = body
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    let line = std::str::from_utf8(&body[line_start..])
        .map_err(|_| corrupt("binary trailer line"))?;

    let (root, changes) = line
        .split_once(' ')
        .ok_or_else(|| corrupt("malformed trailer line"))?;
    let root_offset = root.parse().map_err(|_| corrupt("malformed root offset"))?;
    let changes_offset = changes
        .parse()
        .map_err(|_| corrupt("malformed changes offset"))?;

    let trailer_offset = line_start as u64;
    if root_offset >= trailer_offset || changes_offset > trailer_offset {
        return Err(corrupt("trailer offsets beyond end of file"));
    }

    Ok(RevisionTrailer {
        root_offset,
        changes_offset,
        trailer_offset,
    })
}

/// Root node-revision id of a revision, given the file bytes
pub fn root_id_from_bytes(bytes: &[u8], rev: Revnum) -> Result<NodeRevisionId> {
    let trailer = parse_trailer(bytes, rev)?;
    let node = node_store::parse_rev_node_at(bytes, rev, trailer.root_offset)?;
    Ok(node.id)
}

/// Folded change log of a revision, given the file bytes
pub fn changes_from_bytes(bytes: &[u8], rev: Revnum) -> Result<Vec<ChangedPath>> {
    let trailer = parse_trailer(bytes, rev)?;
    let section = &bytes[trailer.changes_offset as usize..trailer.trailer_offset as usize];
    changes::from_bytes(section).map_err(|e| Error::CorruptRevision {
        rev,
        details: e.to_string(),
    })
}

/// Read the property map of a revision
///
/// The caller validates the revision number; a missing property file
/// below youngest is corruption.
pub fn read_revision_props(paths: &RepoPaths, rev: Revnum) -> Result<PropMap> {
    let bytes = std::fs::read(paths.revprops_file(rev)).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::CorruptRevision {
                rev,
                details: "revision property file missing".to_string(),
            }
        } else {
            Error::from(e)
        }
    })?;
    hashfile::from_bytes(&bytes)
}

/// Atomically replace the property map of a revision
///
/// The caller must hold the repository write lock; readers see either
/// the old map or the new map by rename atomicity.
pub fn write_revision_props(paths: &RepoPaths, rev: Revnum, props: &PropMap) -> Result<()> {
    write_atomic(&paths.revprops_file(rev), &hashfile::to_bytes(props))?;
    Ok(())
}
