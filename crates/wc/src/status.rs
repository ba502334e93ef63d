//! Status driver
//!
//! `status` walks a working copy and reports one record per
//! interesting item: the local text status (modified, added, missing,
//! unversioned, ...) and, when an update comparison was requested,
//! the repository text status describing what HEAD did to the same
//! path. The two fields are orthogonal: a locally modified file can
//! simultaneously be deleted in the repository.
//!
//! Flow for `update = true`:
//!
//! 1. lock the anchor (and target) administrative areas
//! 2. resolve the anchor's recorded URL and open a session
//! 3. probe the URL at HEAD; if gone, flag the run and close the edit
//!    (every local record is tagged repository-deleted)
//! 4. otherwise request a status drive, crawl the working copy into
//!    the reporter, and let `finish_report` drive the editor
//! 5. the editor's `close_edit` performs the local walk, merges what
//!    the drive reported, and emits through the caller's sink
//!
//! Locks are scoped guards; any error path unwinds with them released.

use crate::crawler;
use crate::editor::Editor;
use crate::entries::{self, Entry, Schedule};
use crate::lock::AdminLockSet;
use crate::ra::{LocalSession, RaSession};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tessera_core::{Context, Error, NodeKind, Result, Revnum};
use tessera_fs::path as rpath;

/// Text status of one item, on either side of the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StatusKind {
    /// No information (no local item, or no repository change)
    None,
    /// Present on disk but not under version control
    Unversioned,
    /// Unversioned and matching an ignore pattern
    Ignored,
    /// Versioned and unmodified
    Normal,
    /// Scheduled for addition
    Added,
    /// Versioned but absent from disk
    Missing,
    /// Scheduled for deletion, or deleted on the repository side
    Deleted,
    /// Content differs from the pristine base
    Modified,
}

/// One status record
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Status {
    /// Node kind, when the item is versioned
    pub kind: Option<NodeKind>,
    /// Base revision, when the item is versioned
    pub revision: Option<Revnum>,
    /// Working-copy text status
    pub text_status: StatusKind,
    /// Repository text status; meaningful only for update runs
    pub repos_text_status: StatusKind,
}

impl Status {
    fn unversioned(kind: StatusKind) -> Status {
        Status {
            kind: None,
            revision: None,
            text_status: kind,
            repos_text_status: StatusKind::None,
        }
    }

    fn versioned(entry: &Entry, text_status: StatusKind) -> Status {
        Status {
            kind: Some(entry.kind),
            revision: Some(entry.revision),
            text_status,
            repos_text_status: StatusKind::None,
        }
    }
}

/// Flags controlling a status run
#[derive(Debug, Clone, Default)]
pub struct StatusFlags {
    /// Descend into directories
    pub recurse: bool,
    /// Report unmodified entries too
    pub get_all: bool,
    /// Contact the repository for an out-of-date comparison
    pub update: bool,
    /// Report items matching ignore patterns
    pub no_ignore: bool,
}

/// What the repository side did to a path, as seen by the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReposChange {
    Added,
    Modified,
    Deleted,
}

/// Editor that accumulates repository changes, then walks the working
/// copy on `close_edit` and emits merged records through the sink
pub struct StatusEditor<'a> {
    anchor: PathBuf,
    target: String,
    flags: StatusFlags,
    ctx: &'a Context,
    sink: &'a mut dyn FnMut(&Path, &Status),
    deleted_in_repos: bool,
    target_rev: Option<Revnum>,
    repos: BTreeMap<String, ReposChange>,
    driven: HashSet<String>,
}

impl<'a> StatusEditor<'a> {
    /// Build an editor for one status run
    pub fn new(
        anchor: PathBuf,
        target: String,
        flags: StatusFlags,
        ctx: &'a Context,
        sink: &'a mut dyn FnMut(&Path, &Status),
    ) -> Self {
        StatusEditor {
            anchor,
            target,
            flags,
            ctx,
            sink,
            deleted_in_repos: false,
            target_rev: None,
            repos: BTreeMap::new(),
            driven: HashSet::new(),
        }
    }

    /// Flag the whole run as deleted in the repository
    ///
    /// Every emitted record gets its repository status forced to
    /// `Deleted`.
    pub fn set_deleted_in_repos(&mut self) {
        self.deleted_in_repos = true;
    }

    /// Revision the drive compared against, once known
    pub fn target_revision(&self) -> Option<Revnum> {
        self.target_rev
    }

    /// The editor contract says each path is opened at most once per
    /// drive; enforced in debug builds.
    fn track_once(&mut self, path: &str) {
        if cfg!(debug_assertions) {
            assert!(
                self.driven.insert(path.to_string()),
                "editor drove path '{}' more than once",
                path
            );
        }
    }

    fn mark(&mut self, path: &str, change: ReposChange) {
        // An addition stays an addition even as its contents stream in.
        if matches!(self.repos.get(path), Some(ReposChange::Added)) {
            return;
        }
        self.repos.insert(path.to_string(), change);
    }

    // === Local walk ===

    fn run_walk(&mut self, records: &mut BTreeMap<String, Status>) -> Result<()> {
        if self.target.is_empty() {
            let anchor = self.anchor.clone();
            return self.walk_dir(&anchor, "", records);
        }

        let target = self.target.clone();
        let target_path = self.anchor.join(&target);
        if entries::is_versioned(&target_path) {
            return self.walk_dir(&target_path, &target, records);
        }

        let anchor_entries = entries::read_entries(&self.anchor)?;
        match anchor_entries.get(&target) {
            Some(entry) if entry.kind == NodeKind::File => {
                let status = local_file_status(&self.anchor, &target, entry)?;
                records.insert(target, status);
            }
            Some(entry) => {
                // Versioned directory with no administrative area on
                // disk: missing.
                records.insert(target, Status::versioned(entry, StatusKind::Missing));
            }
            None => {
                let kind = if is_ignored(&target, self.ctx) {
                    StatusKind::Ignored
                } else {
                    StatusKind::Unversioned
                };
                records.insert(target, Status::unversioned(kind));
            }
        }
        Ok(())
    }

    fn walk_dir(
        &mut self,
        dir: &Path,
        wc_prefix: &str,
        records: &mut BTreeMap<String, Status>,
    ) -> Result<()> {
        self.ctx.check_canceled()?;

        let dir_entries = entries::read_entries(dir)?;
        if let Some(this) = dir_entries.get(entries::THIS_DIR) {
            records.insert(wc_prefix.to_string(), dir_status(this));
        }

        let mut names: BTreeSet<String> = dir_entries
            .keys()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect();
        for item in std::fs::read_dir(dir)? {
            let name = item?.file_name().to_string_lossy().into_owned();
            if name != entries::ADM_DIR {
                names.insert(name);
            }
        }

        for name in names {
            let child_path = dir.join(&name);
            let child_wc = rpath::join(wc_prefix, &name);

            match dir_entries.get(&name) {
                Some(entry) if entry.kind == NodeKind::File => {
                    records.insert(child_wc, local_file_status(dir, &name, entry)?);
                }
                Some(entry) => {
                    if self.flags.recurse && entries::is_versioned(&child_path) {
                        self.walk_dir(&child_path, &child_wc, records)?;
                    } else if child_path.is_dir() {
                        records.insert(child_wc, dir_status(entry));
                    } else {
                        records.insert(child_wc, Status::versioned(entry, StatusKind::Missing));
                    }
                }
                None => {
                    if is_ignored(&name, self.ctx) {
                        if self.flags.no_ignore {
                            records.insert(child_wc, Status::unversioned(StatusKind::Ignored));
                        }
                    } else {
                        records.insert(child_wc, Status::unversioned(StatusKind::Unversioned));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Editor for StatusEditor<'_> {
    fn set_target_revision(&mut self, rev: Revnum) -> Result<()> {
        self.target_rev = Some(rev);
        Ok(())
    }

    fn open_root(&mut self, _base_rev: Option<Revnum>) -> Result<()> {
        Ok(())
    }

    fn delete_entry(&mut self, path: &str, _rev: Option<Revnum>) -> Result<()> {
        self.mark(path, ReposChange::Deleted);
        Ok(())
    }

    fn add_directory(&mut self, path: &str) -> Result<()> {
        self.track_once(path);
        self.repos.insert(path.to_string(), ReposChange::Added);
        Ok(())
    }

    fn open_directory(&mut self, path: &str, _base_rev: Option<Revnum>) -> Result<()> {
        self.track_once(path);
        Ok(())
    }

    fn change_dir_prop(&mut self, path: &str, _name: &str, _value: Option<&[u8]>) -> Result<()> {
        self.mark(path, ReposChange::Modified);
        Ok(())
    }

    fn close_directory(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn add_file(&mut self, path: &str) -> Result<()> {
        self.track_once(path);
        self.repos.insert(path.to_string(), ReposChange::Added);
        Ok(())
    }

    fn open_file(&mut self, path: &str, _base_rev: Option<Revnum>) -> Result<()> {
        self.track_once(path);
        Ok(())
    }

    fn apply_textdelta(&mut self, path: &str) -> Result<()> {
        self.mark(path, ReposChange::Modified);
        Ok(())
    }

    fn change_file_prop(&mut self, path: &str, _name: &str, _value: Option<&[u8]>) -> Result<()> {
        self.mark(path, ReposChange::Modified);
        Ok(())
    }

    fn close_file(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn close_edit(&mut self) -> Result<()> {
        let mut records = BTreeMap::new();
        self.run_walk(&mut records)?;

        for (path, change) in std::mem::take(&mut self.repos) {
            let slot = records
                .entry(path)
                .or_insert_with(|| Status::unversioned(StatusKind::None));
            slot.repos_text_status = match change {
                ReposChange::Added => StatusKind::Added,
                ReposChange::Modified => StatusKind::Modified,
                ReposChange::Deleted => StatusKind::Deleted,
            };
        }

        for (rel, mut status) in records {
            if self.deleted_in_repos {
                status.repos_text_status = StatusKind::Deleted;
            }
            if self.flags.get_all || interesting(&status) {
                let abs = rel_to_abs(&self.anchor, &rel);
                (self.sink)(&abs, &status);
            }
        }
        Ok(())
    }

    fn abort_edit(&mut self) -> Result<()> {
        self.repos.clear();
        Ok(())
    }
}

fn interesting(status: &Status) -> bool {
    status.text_status != StatusKind::Normal || status.repos_text_status != StatusKind::None
}

fn dir_status(entry: &Entry) -> Status {
    let text = match entry.schedule {
        Schedule::Add => StatusKind::Added,
        Schedule::Delete => StatusKind::Deleted,
        Schedule::Normal => StatusKind::Normal,
    };
    Status::versioned(entry, text)
}

fn local_file_status(dir: &Path, name: &str, entry: &Entry) -> Result<Status> {
    let text = match entry.schedule {
        Schedule::Add => StatusKind::Added,
        Schedule::Delete => StatusKind::Deleted,
        Schedule::Normal => {
            let working = dir.join(name);
            if !working.is_file() {
                StatusKind::Missing
            } else {
                match std::fs::read(entries::text_base_path(dir, name)) {
                    Ok(pristine) => {
                        if std::fs::read(&working)? == pristine {
                            StatusKind::Normal
                        } else {
                            StatusKind::Modified
                        }
                    }
                    // No pristine recorded: nothing to compare against.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusKind::Normal,
                    Err(e) => return Err(e.into()),
                }
            }
        }
    };
    Ok(Status::versioned(entry, text))
}

fn is_ignored(name: &str, ctx: &Context) -> bool {
    ctx.config
        .global_ignores
        .iter()
        .any(|pattern| glob_match(pattern.as_bytes(), name.as_bytes()))
}

/// Minimal glob matching: `*` and `?` only, byte-wise
fn glob_match(pattern: &[u8], name: &[u8]) -> bool {
    match (pattern.first(), name.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], name)
                || (!name.is_empty() && glob_match(pattern, &name[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &name[1..]),
        (Some(p), Some(n)) if p == n => glob_match(&pattern[1..], &name[1..]),
        _ => false,
    }
}

fn rel_to_abs(anchor: &Path, rel: &str) -> PathBuf {
    if rel.is_empty() {
        anchor.to_path_buf()
    } else {
        rel.split('/').fold(anchor.to_path_buf(), |p, c| p.join(c))
    }
}

/// Run a status walk over `path`
///
/// `sink` receives one `(path, record)` call per interesting item (all
/// versioned items with `get_all`), in sorted path order, parents
/// before children. Returns the repository's youngest revision when
/// `update` was requested, None otherwise.
///
/// # Errors
/// - [`Error::EntryNotFound`] for an unversioned target
/// - [`Error::EntryMissingUrl`] for update runs against an anchor with
///   no recorded URL
/// - [`Error::Canceled`] when the context's probe trips
pub fn status(
    path: &Path,
    sink: &mut dyn FnMut(&Path, &Status),
    flags: &StatusFlags,
    ctx: &Context,
) -> Result<Option<Revnum>> {
    let (anchor, target) = entries::anchor_target(path)?;
    let _locks = AdminLockSet::acquire(&anchor, &target)?;

    if !target.is_empty() && !entries::is_versioned(&anchor.join(&target)) {
        let anchor_entries = entries::read_entries(&anchor)?;
        if !anchor_entries.contains_key(&target) {
            return Err(Error::EntryNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let mut editor = StatusEditor::new(
        anchor.clone(),
        target.clone(),
        flags.clone(),
        ctx,
        sink,
    );

    if !flags.update {
        editor.close_edit()?;
        return Ok(None);
    }

    let anchor_entries = entries::read_entries(&anchor)?;
    let anchor_entry =
        anchor_entries
            .get(entries::THIS_DIR)
            .ok_or_else(|| Error::EntryNotFound {
                path: anchor.clone(),
            })?;
    let url = anchor_entry
        .url
        .clone()
        .ok_or_else(|| Error::EntryMissingUrl {
            path: anchor.clone(),
        })?;
    let base_rev = anchor_entry.revision;

    let session = LocalSession::open(&url)?;
    let mut youngest = session.latest_revnum()?;

    if session.check_path("", None)?.is_none() {
        // The whole anchor is gone from HEAD; a virtual close tags
        // every local record as deleted in the repository.
        tracing::debug!(target: "tessera::wc", url, "anchor deleted in repository");
        editor.set_deleted_in_repos();
        editor.close_edit()?;
    } else {
        let reporter = session.do_status(&target, flags.recurse, &mut editor)?;
        crawler::report_revisions(&anchor, &target, base_rev, reporter, flags.recurse, ctx)?;
        if let Some(rev) = editor.target_revision() {
            youngest = rev;
        }
    }

    Ok(Some(youngest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"*.o", b"main.o"));
        assert!(glob_match(b"*~", b"notes.txt~"));
        assert!(glob_match(b"?x", b"ax"));
        assert!(!glob_match(b"*.o", b"main.c"));
        assert!(!glob_match(b"?x", b"x"));
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"a*b*c", b"a-long-b-way-c"));
    }

    #[test]
    fn test_is_ignored_uses_context_config() {
        let ctx = Context::new();
        assert!(is_ignored("scratch.o", &ctx));
        assert!(is_ignored("draft~", &ctx));
        assert!(!is_ignored("main.rs", &ctx));
    }

    #[test]
    fn test_interesting() {
        let normal = Status {
            kind: Some(NodeKind::File),
            revision: Some(1),
            text_status: StatusKind::Normal,
            repos_text_status: StatusKind::None,
        };
        assert!(!interesting(&normal));

        let modified = Status {
            text_status: StatusKind::Modified,
            ..normal.clone()
        };
        assert!(interesting(&modified));

        let out_of_date = Status {
            repos_text_status: StatusKind::Modified,
            ..normal
        };
        assert!(interesting(&out_of_date));
    }

    #[test]
    fn test_rel_to_abs() {
        let anchor = Path::new("/wc");
        assert_eq!(rel_to_abs(anchor, ""), PathBuf::from("/wc"));
        assert_eq!(rel_to_abs(anchor, "a/b"), PathBuf::from("/wc/a/b"));
    }
}
