//! Remote-access sessions
//!
//! [`RaSession`] is the abstract transport interface the working-copy
//! driver consumes: a liveness probe, the youngest revision, and a
//! status drive that hands back a [`Reporter`] paired with the
//! caller's [`Editor`]. Wire serialization is out of scope here;
//! [`LocalSession`] is the concrete implementation for `file://` URLs,
//! serving a repository on local disk directly.

use crate::editor::Editor;
use crate::reporter::Reporter;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tessera_core::{Error, NodeKind, Result, Revnum};
use tessera_fs::{path as rpath, Filesystem};
use tessera_store::{DirEntries, RepoPaths};

/// Abstract remote-access session bound to one repository URL
pub trait RaSession {
    /// Youngest revision on the remote side
    fn latest_revnum(&self) -> Result<Revnum>;

    /// Kind of the node at `path` (relative to the session URL) in
    /// `rev`, defaulting to HEAD; None if nothing is there
    fn check_path(&self, path: &str, rev: Option<Revnum>) -> Result<Option<NodeKind>>;

    /// Request a status drive
    ///
    /// Returns the reporter the client feeds its state into; the
    /// reporter's `finish_report` drives `editor` synchronously on the
    /// calling thread.
    fn do_status<'a>(
        &'a self,
        target: &str,
        recurse: bool,
        editor: &'a mut (dyn Editor + 'a),
    ) -> Result<Box<dyn Reporter + 'a>>;
}

/// Parse a `file://` URL into (repository root, in-repository path)
///
/// The repository root is discovered by probing each ancestor of the
/// URL path for a store layout, the way a local access layer mounts a
/// repository from inside an arbitrary URL.
pub fn parse_file_url(url: &str) -> Result<(PathBuf, String)> {
    let rest = url.strip_prefix("file://").ok_or_else(|| bad_url(url))?;
    let full = Path::new(rest);

    for ancestor in full.ancestors() {
        if RepoPaths::from_root(ancestor).exists() {
            let in_repo = full
                .strip_prefix(ancestor)
                .expect("ancestors() yields prefixes")
                .to_string_lossy()
                .into_owned();
            return Ok((ancestor.to_path_buf(), in_repo));
        }
    }
    Err(bad_url(url))
}

fn bad_url(url: &str) -> Error {
    Error::PathNotFound {
        path: url.to_string(),
    }
}

/// Session against a repository on local disk
pub struct LocalSession {
    fs: Filesystem,
    base_path: String,
}

impl LocalSession {
    /// Open a session for a `file://` URL
    pub fn open(url: &str) -> Result<LocalSession> {
        let (root, base_path) = parse_file_url(url)?;
        let fs = Filesystem::open(root)?;
        tracing::debug!(target: "tessera::wc", url, base_path, "local session opened");
        Ok(LocalSession { fs, base_path })
    }

    pub(crate) fn fs(&self) -> &Filesystem {
        &self.fs
    }

    pub(crate) fn base_path(&self) -> &str {
        &self.base_path
    }

    fn session_path(&self, rel: &str) -> String {
        if rel.is_empty() {
            self.base_path.clone()
        } else {
            rpath::join(&self.base_path, rel)
        }
    }
}

impl RaSession for LocalSession {
    fn latest_revnum(&self) -> Result<Revnum> {
        self.fs.youngest_rev()
    }

    fn check_path(&self, path: &str, rev: Option<Revnum>) -> Result<Option<NodeKind>> {
        let rev = match rev {
            Some(rev) => rev,
            None => self.fs.youngest_rev()?,
        };
        let root = self.fs.revision_root(rev)?;
        root.check_path(&self.session_path(path))
    }

    fn do_status<'a>(
        &'a self,
        target: &str,
        recurse: bool,
        editor: &'a mut (dyn Editor + 'a),
    ) -> Result<Box<dyn Reporter + 'a>> {
        Ok(Box::new(StatusReporter {
            session: self,
            target: target.to_string(),
            recurse,
            editor,
            base_rev: None,
            states: BTreeMap::new(),
        }))
    }
}

/// One per-path assertion received from the client
#[derive(Debug, Clone)]
enum ReportState {
    /// Client has the path at this revision
    Set(Revnum),
    /// Client does not have the path
    Delete,
    /// Client has the path, but from another repository location
    Link { path: String, rev: Revnum },
}

/// Reporter side of a local status drive
///
/// Accumulates the client's assertions, then `finish_report` computes
/// the delta between the described tree and HEAD and replays it into
/// the editor.
struct StatusReporter<'a> {
    session: &'a LocalSession,
    target: String,
    recurse: bool,
    editor: &'a mut (dyn Editor + 'a),
    base_rev: Option<Revnum>,
    states: BTreeMap<String, ReportState>,
}

impl Reporter for StatusReporter<'_> {
    fn set_path(&mut self, path: &str, rev: Revnum, _start_empty: bool) -> Result<()> {
        if path.is_empty() {
            self.base_rev = Some(rev);
        } else {
            self.states.insert(path.to_string(), ReportState::Set(rev));
        }
        Ok(())
    }

    fn delete_path(&mut self, path: &str) -> Result<()> {
        self.states.insert(path.to_string(), ReportState::Delete);
        Ok(())
    }

    fn link_path(&mut self, path: &str, url: &str, rev: Revnum) -> Result<()> {
        let (_, repo_path) = parse_file_url(url)?;
        self.states
            .insert(path.to_string(), ReportState::Link { path: repo_path, rev });
        Ok(())
    }

    fn finish_report(self: Box<Self>) -> Result<()> {
        let StatusReporter {
            session,
            target,
            recurse,
            editor,
            base_rev,
            states,
        } = *self;

        let base_rev = base_rev.ok_or_else(|| {
            Error::from(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "report did not set a base revision",
            ))
        })?;

        let drive = Drive {
            session,
            target,
            recurse,
            states,
        };
        match drive.run(&mut *editor, base_rev) {
            Ok(()) => editor.close_edit(),
            Err(e) => {
                let _ = editor.abort_edit();
                Err(e)
            }
        }
    }

    fn abort_report(self: Box<Self>) -> Result<()> {
        self.editor.abort_edit()
    }
}

/// Where the client's copy of a path lives: repository path + revision
type BaseLoc = Option<(String, Revnum)>;

struct Drive<'a> {
    session: &'a LocalSession,
    target: String,
    recurse: bool,
    states: BTreeMap<String, ReportState>,
}

impl Drive<'_> {
    fn run(&self, editor: &mut (dyn Editor + '_), base_rev: Revnum) -> Result<()> {
        let head = self.session.latest_revnum()?;
        editor.set_target_revision(head)?;
        editor.open_root(Some(base_rev))?;

        let anchor = self.session.base_path().to_string();
        self.compare_dirs(editor, "", Some((anchor, base_rev)), head, 0)?;
        Ok(())
    }

    fn head_path(&self, wc_path: &str) -> String {
        if wc_path.is_empty() {
            self.session.base_path().to_string()
        } else {
            rpath::join(self.session.base_path(), wc_path)
        }
    }

    /// Any assertion strictly below `wc_path` forces a descent even
    /// when the directory looks unchanged at this level.
    fn has_state_under(&self, wc_path: &str) -> bool {
        let prefix = format!("{}/", wc_path);
        self.states.keys().any(|k| k.starts_with(&prefix))
    }

    fn dir_entries_or_empty(&self, rev: Revnum, repo_path: &str) -> Result<DirEntries> {
        let root = self.session.fs().revision_root(rev)?;
        match root.check_path(repo_path)? {
            Some(NodeKind::Directory) => root.dir_entries(repo_path),
            _ => Ok(DirEntries::new()),
        }
    }

    fn compare_dirs(
        &self,
        editor: &mut (dyn Editor + '_),
        wc_path: &str,
        base_loc: BaseLoc,
        head: Revnum,
        depth: usize,
    ) -> Result<()> {
        let head_entries = self.dir_entries_or_empty(head, &self.head_path(wc_path))?;
        let base_entries = match &base_loc {
            Some((path, rev)) => self.dir_entries_or_empty(*rev, path)?,
            None => DirEntries::new(),
        };

        let names: BTreeSet<&String> = base_entries.keys().chain(head_entries.keys()).collect();

        for name in names {
            if depth == 0 && !self.target.is_empty() && **name != self.target {
                continue;
            }
            let child_wc = rpath::join(wc_path, name);

            let child_base: BaseLoc = match self.states.get(&child_wc) {
                Some(ReportState::Delete) => None,
                Some(ReportState::Link { path, rev }) => Some((path.clone(), *rev)),
                Some(ReportState::Set(rev)) => base_loc
                    .as_ref()
                    .map(|(path, _)| (rpath::join(path, name), *rev)),
                None => match base_entries.contains_key(name.as_str()) {
                    true => base_loc
                        .as_ref()
                        .map(|(path, rev)| (rpath::join(path, name), *rev)),
                    false => None,
                },
            };

            // Resolve what the client actually has there.
            let base_node = match &child_base {
                Some((path, rev)) => {
                    let root = self.session.fs().revision_root(*rev)?;
                    match root.check_path(path)? {
                        Some(kind) => Some((root.node_id(path)?, kind)),
                        None => None,
                    }
                }
                None => None,
            };
            let head_entry = head_entries.get(name.as_str());

            match (base_node, head_entry) {
                (None, None) => {}
                (Some(_), None) => editor.delete_entry(&child_wc, None)?,
                (None, Some(entry)) => self.emit_add(editor, &child_wc, head, entry.kind)?,
                (Some((base_id, base_kind)), Some(entry)) => {
                    if base_kind != entry.kind {
                        editor.delete_entry(&child_wc, None)?;
                        self.emit_add(editor, &child_wc, head, entry.kind)?;
                    } else if base_kind == NodeKind::Directory {
                        let changed = base_id != entry.id;
                        if changed || self.has_state_under(&child_wc) {
                            let base_rev = child_base.as_ref().map(|(_, rev)| *rev);
                            editor.open_directory(&child_wc, base_rev)?;
                            if self.recurse {
                                self.compare_dirs(editor, &child_wc, child_base, head, depth + 1)?;
                            }
                            editor.close_directory(&child_wc)?;
                        }
                    } else if base_id != entry.id {
                        let base_rev = child_base.as_ref().map(|(_, rev)| *rev);
                        editor.open_file(&child_wc, base_rev)?;
                        editor.apply_textdelta(&child_wc)?;
                        editor.close_file(&child_wc)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Replay a subtree the client does not have as additions
    fn emit_add(
        &self,
        editor: &mut (dyn Editor + '_),
        wc_path: &str,
        head: Revnum,
        kind: NodeKind,
    ) -> Result<()> {
        match kind {
            NodeKind::File => {
                editor.add_file(wc_path)?;
                editor.apply_textdelta(wc_path)?;
                editor.close_file(wc_path)
            }
            NodeKind::Directory => {
                editor.add_directory(wc_path)?;
                if self.recurse {
                    let entries = self.dir_entries_or_empty(head, &self.head_path(wc_path))?;
                    for (name, entry) in entries {
                        self.emit_add(editor, &rpath::join(wc_path, &name), head, entry.kind)?;
                    }
                }
                editor.close_directory(wc_path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tessera_fs::TxnOps;

    fn repo_with_tree() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        let fs = Filesystem::create(&repo).unwrap();
        let txn = fs.begin_txn(0).unwrap();
        let root = txn.root().unwrap();
        root.make_dir("trunk").unwrap();
        root.make_file("trunk/a").unwrap();
        root.set_file_contents("trunk/a", "alpha").unwrap();
        txn.commit().unwrap();
        (dir, repo)
    }

    fn file_url(repo: &Path, sub: &str) -> String {
        if sub.is_empty() {
            format!("file://{}", repo.display())
        } else {
            format!("file://{}/{}", repo.display(), sub)
        }
    }

    #[test]
    fn test_parse_file_url_finds_repo_root() {
        let (_dir, repo) = repo_with_tree();

        let (root, inside) = parse_file_url(&file_url(&repo, "trunk/a")).unwrap();
        assert_eq!(root, repo);
        assert_eq!(inside, "trunk/a");

        let (root, inside) = parse_file_url(&file_url(&repo, "")).unwrap();
        assert_eq!(root, repo);
        assert_eq!(inside, "");
    }

    #[test]
    fn test_parse_file_url_rejects_non_repo() {
        let dir = tempdir().unwrap();
        let url = format!("file://{}/nothing", dir.path().display());
        assert!(parse_file_url(&url).is_err());
        assert!(parse_file_url("http://example.com/x").is_err());
    }

    #[test]
    fn test_check_path_at_head_and_base() {
        let (_dir, repo) = repo_with_tree();
        let session = LocalSession::open(&file_url(&repo, "trunk")).unwrap();

        assert_eq!(session.latest_revnum().unwrap(), 1);
        assert_eq!(
            session.check_path("", None).unwrap(),
            Some(NodeKind::Directory)
        );
        assert_eq!(session.check_path("a", None).unwrap(), Some(NodeKind::File));
        assert_eq!(session.check_path("a", Some(0)).unwrap(), None);
        assert_eq!(session.check_path("ghost", None).unwrap(), None);
    }
}
