//! End-to-end working-copy status scenarios
//!
//! Builds a real repository, checks out a working copy, then drives
//! `status` with and without the repository comparison.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera::{
    checkout, status, Context, Error, Filesystem, Status, StatusFlags, StatusKind, TxnOps,
};

struct Fixture {
    _dir: tempfile::TempDir,
    repo: PathBuf,
    wc: PathBuf,
}

/// Repository with `trunk/{a,b,sub/c}` at revision 1, checked out.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    let wc = dir.path().join("wc");

    let fs = Filesystem::create(&repo).unwrap();
    let txn = fs.begin_txn(0).unwrap();
    let root = txn.root().unwrap();
    root.make_dir("trunk").unwrap();
    for (path, contents) in [("trunk/a", "alpha"), ("trunk/b", "beta")] {
        root.make_file(path).unwrap();
        root.set_file_contents(path, contents).unwrap();
    }
    root.make_dir("trunk/sub").unwrap();
    root.make_file("trunk/sub/c").unwrap();
    root.set_file_contents("trunk/sub/c", "gamma").unwrap();
    txn.commit().unwrap();

    let url = format!("file://{}/trunk", repo.display());
    let rev = checkout(&url, None, &wc, &Context::new()).unwrap();
    assert_eq!(rev, 1);

    Fixture {
        _dir: dir,
        repo,
        wc,
    }
}

/// Run status and collect records keyed by path relative to the wc.
fn collect(
    operand: &Path,
    wc_root: &Path,
    flags: &StatusFlags,
    ctx: &Context,
) -> (Option<u64>, BTreeMap<String, Status>) {
    let mut records = BTreeMap::new();
    let youngest = {
        let mut sink = |path: &Path, status: &Status| {
            let rel = path
                .strip_prefix(wc_root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            records.insert(rel, status.clone());
        };
        status(operand, &mut sink, flags, ctx).unwrap()
    };
    (youngest, records)
}

fn recurse() -> StatusFlags {
    StatusFlags {
        recurse: true,
        ..Default::default()
    }
}

#[test]
fn clean_checkout_reports_nothing_interesting() {
    let fx = fixture();
    let (youngest, records) = collect(&fx.wc, &fx.wc, &recurse(), &Context::new());
    assert_eq!(youngest, None);
    assert!(records.is_empty(), "unexpected: {:?}", records);
}

#[test]
fn get_all_reports_every_entry_as_normal() {
    let fx = fixture();
    let flags = StatusFlags {
        recurse: true,
        get_all: true,
        ..Default::default()
    };
    let (_, records) = collect(&fx.wc, &fx.wc, &flags, &Context::new());

    for path in ["", "a", "b", "sub", "sub/c"] {
        let record = records.get(path).unwrap_or_else(|| panic!("missing {}", path));
        assert_eq!(record.text_status, StatusKind::Normal, "path {}", path);
    }
}

#[test]
fn local_states_are_classified() {
    let fx = fixture();

    // Modified file, missing file, unversioned file, ignored file.
    std::fs::write(fx.wc.join("a"), "alpha changed").unwrap();
    std::fs::remove_file(fx.wc.join("b")).unwrap();
    std::fs::write(fx.wc.join("new.txt"), "untracked").unwrap();
    std::fs::write(fx.wc.join("scratch.o"), "object file").unwrap();

    let (_, records) = collect(&fx.wc, &fx.wc, &recurse(), &Context::new());
    assert_eq!(records["a"].text_status, StatusKind::Modified);
    assert_eq!(records["b"].text_status, StatusKind::Missing);
    assert_eq!(records["new.txt"].text_status, StatusKind::Unversioned);
    assert!(!records.contains_key("scratch.o"));

    // The ignored item appears once no_ignore is set.
    let flags = StatusFlags {
        recurse: true,
        no_ignore: true,
        ..Default::default()
    };
    let (_, records) = collect(&fx.wc, &fx.wc, &flags, &Context::new());
    assert_eq!(records["scratch.o"].text_status, StatusKind::Ignored);
}

#[test]
fn update_reports_out_of_date_paths() {
    let fx = fixture();

    // Third party moves HEAD: modify b, add d, delete sub/c.
    let fs = Filesystem::open(&fx.repo).unwrap();
    let txn = fs.begin_txn(1).unwrap();
    let root = txn.root().unwrap();
    root.set_file_contents("trunk/b", "beta v2").unwrap();
    root.make_file("trunk/d").unwrap();
    root.set_file_contents("trunk/d", "delta").unwrap();
    root.delete("trunk/sub/c").unwrap();
    txn.commit().unwrap();

    // One local modification that HEAD did not touch.
    std::fs::write(fx.wc.join("a"), "alpha local").unwrap();

    let flags = StatusFlags {
        recurse: true,
        update: true,
        ..Default::default()
    };
    let (youngest, records) = collect(&fx.wc, &fx.wc, &flags, &Context::new());
    assert_eq!(youngest, Some(2));

    assert_eq!(records["a"].text_status, StatusKind::Modified);
    assert_eq!(records["a"].repos_text_status, StatusKind::None);

    assert_eq!(records["b"].text_status, StatusKind::Normal);
    assert_eq!(records["b"].repos_text_status, StatusKind::Modified);

    assert_eq!(records["d"].text_status, StatusKind::None);
    assert_eq!(records["d"].repos_text_status, StatusKind::Added);

    assert_eq!(records["sub/c"].repos_text_status, StatusKind::Deleted);
}

#[test]
fn update_with_deleted_anchor_marks_everything_deleted() {
    let fx = fixture();

    // HEAD deletes the whole checked-out subtree.
    let fs = Filesystem::open(&fx.repo).unwrap();
    let txn = fs.begin_txn(1).unwrap();
    txn.root().unwrap().delete("trunk").unwrap();
    txn.commit().unwrap();

    let flags = StatusFlags {
        recurse: true,
        update: true,
        ..Default::default()
    };
    let (youngest, records) = collect(&fx.wc, &fx.wc, &flags, &Context::new());
    assert_eq!(youngest, Some(2));

    for path in ["", "a", "b", "sub", "sub/c"] {
        let record = records.get(path).unwrap_or_else(|| panic!("missing {}", path));
        assert_eq!(
            record.repos_text_status,
            StatusKind::Deleted,
            "path {}",
            path
        );
    }
}

#[test]
fn status_on_single_file_target() {
    let fx = fixture();

    // HEAD modifies a; the local copy of a is also dirty.
    let fs = Filesystem::open(&fx.repo).unwrap();
    let txn = fs.begin_txn(1).unwrap();
    txn.root()
        .unwrap()
        .set_file_contents("trunk/a", "alpha v2")
        .unwrap();
    txn.commit().unwrap();
    std::fs::write(fx.wc.join("a"), "alpha local").unwrap();

    let flags = StatusFlags {
        recurse: true,
        update: true,
        ..Default::default()
    };
    let (_, records) = collect(&fx.wc.join("a"), &fx.wc, &flags, &Context::new());

    assert_eq!(records["a"].text_status, StatusKind::Modified);
    assert_eq!(records["a"].repos_text_status, StatusKind::Modified);

    // Sibling paths are outside the target.
    assert!(!records.contains_key("b"));
}

#[test]
fn unversioned_target_is_a_usage_error() {
    let fx = fixture();
    let mut sink = |_: &Path, _: &Status| {};
    let err = status(
        &fx.wc.join("ghost"),
        &mut sink,
        &recurse(),
        &Context::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::EntryNotFound { .. }));
}

#[test]
fn cancellation_unwinds_and_releases_locks() {
    let fx = fixture();

    let ctx = Context::new().with_cancel(Arc::new(|| true));
    let mut sink = |_: &Path, _: &Status| {};
    let err = status(&fx.wc, &mut sink, &recurse(), &ctx).unwrap_err();
    assert!(err.is_canceled());

    // The administrative lock was released on the error path.
    let mut sink = |_: &Path, _: &Status| {};
    status(&fx.wc, &mut sink, &recurse(), &Context::new()).unwrap();
}

#[test]
fn schedule_delete_is_reported() {
    let fx = fixture();

    // Schedule b for deletion by editing the administrative area.
    let mut entries = tessera_wc::entries::read_entries(&fx.wc).unwrap();
    entries.get_mut("b").unwrap().schedule = tessera_wc::Schedule::Delete;
    tessera_wc::entries::write_entries(&fx.wc, &entries).unwrap();

    let (_, records) = collect(&fx.wc, &fx.wc, &recurse(), &Context::new());
    assert_eq!(records["b"].text_status, StatusKind::Deleted);
}
