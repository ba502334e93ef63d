//! Checkout
//!
//! Materializes a repository subtree as a working copy: the tree's
//! files and directories on disk, an administrative area per
//! directory, and a pristine text-base copy of every file so local
//! modifications can be detected without contacting the repository.

use crate::entries::{self, Entries, Entry, Schedule};
use crate::ra::{LocalSession, RaSession};
use std::path::Path;
use tessera_core::{Context, Error, NodeKind, Result, Revnum};
use tessera_fs::{path as rpath, Root};

/// Check out `url` at `revision` (default HEAD) into `dest`
///
/// Returns the revision that was checked out.
pub fn checkout(
    url: &str,
    revision: Option<Revnum>,
    dest: &Path,
    ctx: &Context,
) -> Result<Revnum> {
    let session = LocalSession::open(url)?;
    let rev = match revision {
        Some(rev) => rev,
        None => session.latest_revnum()?,
    };

    let root = session.fs().revision_root(rev)?;
    let base_path = session.base_path().to_string();
    match root.check_path(&base_path)? {
        Some(NodeKind::Directory) => {}
        Some(NodeKind::File) => {
            return Err(Error::NotDirectory { path: base_path });
        }
        None => {
            return Err(Error::PathNotFound { path: base_path });
        }
    }

    checkout_dir(&root, &base_path, url, dest, rev, ctx)?;
    tracing::info!(target: "tessera::wc", url, rev, dest = %dest.display(), "checkout complete");
    Ok(rev)
}

fn checkout_dir(
    root: &Root<'_>,
    repo_path: &str,
    url: &str,
    dest: &Path,
    rev: Revnum,
    ctx: &Context,
) -> Result<()> {
    ctx.check_canceled()?;
    std::fs::create_dir_all(dest)?;

    let mut wc_entries = Entries::new();
    wc_entries.insert(
        entries::THIS_DIR.to_string(),
        Entry {
            kind: NodeKind::Directory,
            revision: rev,
            url: Some(url.to_string()),
            schedule: Schedule::Normal,
        },
    );

    for (name, dirent) in root.dir_entries(repo_path)? {
        let child_repo = rpath::join(repo_path, &name);
        let child_url = format!("{}/{}", url, name);

        match dirent.kind {
            NodeKind::File => {
                let contents = root.file_contents(&child_repo)?;
                std::fs::write(dest.join(&name), &contents)?;

                let text_base = entries::text_base_path(dest, &name);
                std::fs::create_dir_all(text_base.parent().expect("text-base has a parent"))?;
                std::fs::write(text_base, &contents)?;

                wc_entries.insert(
                    name,
                    Entry {
                        kind: NodeKind::File,
                        revision: rev,
                        url: Some(child_url),
                        schedule: Schedule::Normal,
                    },
                );
            }
            NodeKind::Directory => {
                checkout_dir(root, &child_repo, &child_url, &dest.join(&name), rev, ctx)?;
                wc_entries.insert(
                    name,
                    Entry {
                        kind: NodeKind::Directory,
                        revision: rev,
                        url: Some(child_url),
                        schedule: Schedule::Normal,
                    },
                );
            }
        }
    }

    entries::write_entries(dest, &wc_entries)
}
