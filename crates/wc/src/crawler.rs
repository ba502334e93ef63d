//! Working-copy crawler
//!
//! Walks a working copy depth-first and describes it to a
//! [`Reporter`]: the base revision of the whole tree first, then one
//! assertion per entry that deviates: a different base revision, a
//! scheduled deletion, or a switched subtree. `finish_report` then
//! releases the editor callbacks synchronously on the calling thread.
//! The cancellation probe is consulted at every directory boundary.

use crate::entries::{self, Entry, Schedule};
use crate::reporter::Reporter;
use std::path::Path;
use tessera_core::{Context, NodeKind, Result, Revnum};
use tessera_fs::path as rpath;

/// Crawl the working copy into `reporter`, then finish the report
///
/// On any crawl error the report is aborted (the editor sees
/// `abort_edit`) and the error propagates unchanged.
pub(crate) fn report_revisions(
    anchor: &Path,
    target: &str,
    base_rev: Revnum,
    mut reporter: Box<dyn Reporter + '_>,
    recurse: bool,
    ctx: &Context,
) -> Result<()> {
    let crawled = crawl(anchor, target, base_rev, reporter.as_mut(), recurse, ctx);
    match crawled {
        Ok(()) => reporter.finish_report(),
        Err(e) => {
            let _ = reporter.abort_report();
            Err(e)
        }
    }
}

fn crawl(
    anchor: &Path,
    target: &str,
    base_rev: Revnum,
    reporter: &mut dyn Reporter,
    recurse: bool,
    ctx: &Context,
) -> Result<()> {
    reporter.set_path("", base_rev, false)?;

    if target.is_empty() {
        return crawl_dir(anchor, "", base_rev, reporter, recurse, ctx);
    }

    // File (or single-entry) operand: describe just the target.
    let anchor_entries = entries::read_entries(anchor)?;
    let Some(entry) = anchor_entries.get(target) else {
        return Ok(());
    };
    let anchor_url = anchor_entries
        .get(entries::THIS_DIR)
        .and_then(|e| e.url.clone());
    report_entry(target, target, entry, anchor_url.as_deref(), base_rev, reporter)?;

    let target_dir = anchor.join(target);
    if recurse
        && entry.kind == NodeKind::Directory
        && entry.schedule == Schedule::Normal
        && entries::is_versioned(&target_dir)
    {
        crawl_dir(&target_dir, target, entry.revision, reporter, recurse, ctx)?;
    }
    Ok(())
}

/// Describe one entry if it deviates from what the server will assume
fn report_entry(
    name: &str,
    wc_path: &str,
    entry: &Entry,
    parent_url: Option<&str>,
    parent_rev: Revnum,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    match entry.schedule {
        // The server should treat the path as absent.
        Schedule::Delete => return reporter.delete_path(wc_path),
        // Not in the repository yet; nothing to report.
        Schedule::Add => return Ok(()),
        Schedule::Normal => {}
    }

    if let (Some(parent_url), Some(url)) = (parent_url, entry.url.as_deref()) {
        let expected = format!("{}/{}", parent_url, name);
        if url != expected {
            return reporter.link_path(wc_path, url, entry.revision);
        }
    }

    if entry.revision != parent_rev {
        reporter.set_path(wc_path, entry.revision, false)?;
    }
    Ok(())
}

fn crawl_dir(
    dir: &Path,
    wc_prefix: &str,
    dir_rev: Revnum,
    reporter: &mut dyn Reporter,
    recurse: bool,
    ctx: &Context,
) -> Result<()> {
    ctx.check_canceled()?;

    let dir_entries = entries::read_entries(dir)?;
    let dir_url = dir_entries
        .get(entries::THIS_DIR)
        .and_then(|e| e.url.clone());

    for (name, entry) in &dir_entries {
        if name.is_empty() {
            continue;
        }
        let child_wc = rpath::join(wc_prefix, name);
        report_entry(name, &child_wc, entry, dir_url.as_deref(), dir_rev, reporter)?;

        if recurse && entry.kind == NodeKind::Directory && entry.schedule == Schedule::Normal {
            let child_dir = dir.join(name);
            if entries::is_versioned(&child_dir) {
                crawl_dir(&child_dir, &child_wc, entry.revision, reporter, recurse, ctx)?;
            }
        }
    }
    Ok(())
}
