// tests/executor_mock_fs.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use codesync::exec::{RetryPolicy, SyncExecutor};
use codesync::exec::executor::temp_sibling;
use codesync::fs::mock::{MockEntry, MockFileSystem, MockOp};
use codesync::types::{ActionKind, AppliedOp, FailureKind, SkipReason, SyncOutcome, SyncResult};

mod common;
use crate::common::RootBuilder;

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    }
}

fn setup(root: RootBuilder, retry: RetryPolicy) -> (MockFileSystem, SyncExecutor) {
    let fs = MockFileSystem::new();
    fs.add_dir("/src");
    fs.add_dir("/dst");
    let exec = SyncExecutor::new(Arc::new(fs.clone()), [Arc::new(root.build())], retry, false);
    (fs, exec)
}

fn simple() -> (MockFileSystem, SyncExecutor) {
    setup(
        RootBuilder::new("src", "/src").exclude("*.tmp").target("dst", "/dst"),
        fast_retry(3),
    )
}

fn one(results: Vec<SyncResult>) -> SyncResult {
    assert_eq!(results.len(), 1, "{results:?}");
    results.into_iter().next().unwrap()
}

fn file_meta(fs: &MockFileSystem, path: &str) -> (Vec<u8>, std::time::SystemTime, u32) {
    match fs.entry(path) {
        Some(MockEntry::File { data, modified, mode }) => (data, modified, mode),
        other => panic!("expected file at {path}, found {other:?}"),
    }
}

#[test]
fn create_copies_contents_mtime_and_mode() {
    let (fs, exec) = simple();
    fs.add_file("/src/a.txt", "hello");
    fs.set_mode("/src/a.txt", 0o755);

    let r = one(exec.apply_kind("src", "a.txt", ActionKind::Create));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Copied));
    assert_eq!(r.attempts, 1);
    assert_eq!(r.target_id, "dst");

    assert_eq!(file_meta(&fs, "/dst/a.txt"), file_meta(&fs, "/src/a.txt"));
    assert_eq!(
        fs.paths_under("/dst"),
        vec![PathBuf::from("/dst"), PathBuf::from("/dst/a.txt")],
        "no temporary file is left behind"
    );
}

#[test]
fn writes_go_through_a_temp_sibling() {
    let (fs, exec) = simple();
    fs.add_file("/src/dir/a.txt", "x");
    exec.apply_kind("src", "dir/a.txt", ActionKind::Modify);

    let tmp = temp_sibling(Path::new("/dst/dir/a.txt"));
    let renames: Vec<_> = fs
        .ops()
        .into_iter()
        .filter(|(op, _)| *op == MockOp::Rename)
        .collect();
    assert_eq!(renames, vec![(MockOp::Rename, PathBuf::from("/dst/dir/a.txt"))]);
    assert!(fs.entry(&tmp).is_none());
}

#[test]
fn replaying_an_action_is_a_no_op() {
    let (fs, exec) = simple();
    fs.add_file("/src/a.txt", "hello");
    exec.apply_kind("src", "a.txt", ActionKind::Create);

    fs.clear_ops();
    let r = one(exec.apply_kind("src", "a.txt", ActionKind::Modify));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Unchanged));
    assert!(fs.mutations_under("/dst").is_empty());
}

#[test]
fn modify_overwrites_stale_destination() {
    let (fs, exec) = simple();
    fs.add_file("/dst/a.txt", "old");
    fs.add_file("/src/a.txt", "new contents");

    let r = one(exec.apply_kind("src", "a.txt", ActionKind::Modify));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Copied));
    assert_eq!(fs.contents("/dst/a.txt").unwrap(), b"new contents");
}

#[test]
fn delete_removes_files_and_trees() {
    let (fs, exec) = simple();
    fs.add_file("/dst/a.txt", "x");
    fs.add_file("/dst/pkg/b.txt", "y");
    fs.add_file("/dst/pkg/sub/c.txt", "z");

    let r = one(exec.apply_kind("src", "a.txt", ActionKind::Delete));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Removed));
    let r = one(exec.apply_kind("src", "pkg", ActionKind::Delete));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Removed));
    assert_eq!(fs.paths_under("/dst"), vec![PathBuf::from("/dst")]);

    let r = one(exec.apply_kind("src", "a.txt", ActionKind::Delete));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::AlreadyAbsent));
}

#[test]
fn delete_with_live_source_copies_instead() {
    let (fs, exec) = simple();
    fs.add_file("/src/back.txt", "still here");

    let r = one(exec.apply_kind("src", "back.txt", ActionKind::Delete));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Copied));
    assert_eq!(fs.contents("/dst/back.txt").unwrap(), b"still here");

    let r = one(exec.apply_kind("src", "back.txt", ActionKind::Delete));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Unchanged));
}

#[test]
fn vanished_source_means_remove() {
    let (fs, exec) = simple();
    fs.add_file("/dst/gone.txt", "stale");

    let r = one(exec.apply_kind("src", "gone.txt", ActionKind::Modify));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Removed));
    assert!(fs.entry("/dst/gone.txt").is_none());
}

#[test]
fn excluded_paths_never_touch_the_destination() {
    let (fs, exec) = simple();
    fs.add_file("/src/build.tmp", "x");
    fs.add_file("/dst/old.tmp", "keep me");
    fs.clear_ops();

    for (rel, kind) in [
        ("build.tmp", ActionKind::Create),
        ("old.tmp", ActionKind::Delete),
        ("never-existed.tmp", ActionKind::Delete),
    ] {
        let r = one(exec.apply_kind("src", rel, kind));
        assert_eq!(r.outcome, SyncOutcome::Skipped(SkipReason::Excluded), "{rel}");
        assert_eq!(r.attempts, 0);
    }
    assert!(fs.mutations_under("/dst").is_empty());
    assert_eq!(fs.contents("/dst/old.tmp").unwrap(), b"keep me");
}

#[test]
fn transient_errors_are_retried() {
    let (fs, exec) = simple();
    fs.add_file("/src/a.txt", "hello");
    fs.fail_times(MockOp::Rename, "/dst", ErrorKind::ResourceBusy, 2);

    let r = one(exec.apply_kind("src", "a.txt", ActionKind::Create));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Copied));
    assert_eq!(r.attempts, 3);
    assert_eq!(fs.contents("/dst/a.txt").unwrap(), b"hello");
}

#[test]
fn exhausted_retries_report_transient_failure() {
    let (fs, exec) = simple();
    fs.add_file("/src/a.txt", "hello");
    fs.fail_times(MockOp::Rename, "/dst", ErrorKind::TimedOut, 10);

    let r = one(exec.apply_kind("src", "a.txt", ActionKind::Create));
    match &r.outcome {
        SyncOutcome::Failed(f) => assert_eq!(f.kind, FailureKind::TransientIo),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(r.attempts, 3);
    assert_eq!(
        fs.paths_under("/dst"),
        vec![PathBuf::from("/dst")],
        "failed writes clean up their temp file"
    );
}

#[test]
fn permanent_errors_fail_without_retry() {
    let (fs, exec) = simple();
    fs.add_file("/src/a.txt", "hello");
    fs.fail_times(MockOp::Write, "/dst", ErrorKind::PermissionDenied, 10);

    let r = one(exec.apply_kind("src", "a.txt", ActionKind::Create));
    match &r.outcome {
        SyncOutcome::Failed(f) => {
            assert_eq!(f.kind, FailureKind::PermanentIo);
            assert!(f.message.contains("injected"), "{}", f.message);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(r.attempts, 1);
}

#[test]
fn escaping_paths_are_refused() {
    let (fs, exec) = simple();
    fs.add_file("/etc/passwd", "root");
    fs.clear_ops();

    let r = one(exec.apply_kind("src", "../etc/passwd", ActionKind::Delete));
    match &r.outcome {
        SyncOutcome::Failed(f) => assert_eq!(f.kind, FailureKind::PathEscape),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(r.attempts, 0);
    assert!(fs.entry("/etc/passwd").is_some());
    assert!(fs.mutations_under("/").is_empty());
}

#[test]
fn symlinked_destination_dir_is_refused() {
    let (fs, exec) = simple();
    fs.add_dir("/elsewhere");
    fs.add_symlink("/dst/link", "/elsewhere");
    fs.add_file("/src/link/a.txt", "x");

    let r = one(exec.apply_kind("src", "link/a.txt", ActionKind::Create));
    assert!(
        matches!(&r.outcome, SyncOutcome::Failed(f) if f.kind == FailureKind::PathEscape),
        "{r:?}"
    );
    assert!(fs.paths_under("/elsewhere").len() == 1);
}

#[test]
fn source_symlinks_are_skipped() {
    let (fs, exec) = simple();
    fs.add_file("/src/real.txt", "x");
    fs.add_symlink("/src/alias.txt", "/src/real.txt");

    let r = one(exec.apply_kind("src", "alias.txt", ActionKind::Create));
    assert_eq!(r.outcome, SyncOutcome::Skipped(SkipReason::Symlink));
    assert!(fs.entry("/dst/alias.txt").is_none());
}

#[test]
fn new_directory_is_mirrored_without_excluded_entries() {
    let (fs, exec) = simple();
    fs.add_file("/src/pkg/a.txt", "a");
    fs.add_file("/src/pkg/b.tmp", "b");
    fs.add_file("/src/pkg/sub/c.txt", "c");

    let r = one(exec.apply_kind("src", "pkg", ActionKind::Create));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::CopiedTree { files: 2 }));
    assert_eq!(
        fs.paths_under("/dst/pkg"),
        vec![
            PathBuf::from("/dst/pkg"),
            PathBuf::from("/dst/pkg/a.txt"),
            PathBuf::from("/dst/pkg/sub"),
            PathBuf::from("/dst/pkg/sub/c.txt"),
        ]
    );
}

#[test]
fn type_changes_replace_the_destination_entry() {
    let (fs, exec) = simple();
    fs.add_file("/dst/x/inner.txt", "old tree");
    fs.add_file("/src/x", "now a file");

    let r = one(exec.apply_kind("src", "x", ActionKind::Modify));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Copied));
    assert_eq!(fs.contents("/dst/x").unwrap(), b"now a file");
    assert!(fs.entry("/dst/x/inner.txt").is_none());

    // And back: the file becomes a directory.
    fs.add_dir("/src/y");
    fs.add_file("/src/y/z.txt", "z");
    fs.add_file("/dst/y", "was a file");
    let r = one(exec.apply_kind("src", "y/z.txt", ActionKind::Create));
    assert_eq!(r.outcome, SyncOutcome::Applied(AppliedOp::Copied));
    assert_eq!(fs.contents("/dst/y/z.txt").unwrap(), b"z");
}

#[test]
fn each_target_gets_its_own_result() {
    let (fs, exec) = setup(
        RootBuilder::new("src", "/src")
            .target("one", "/dst")
            .target("two", "/dst2"),
        RetryPolicy::none(),
    );
    fs.add_dir("/dst2");
    fs.add_file("/src/a.txt", "hello");
    fs.fail_times(MockOp::Write, "/dst2", ErrorKind::PermissionDenied, 1);

    let results = exec.apply_kind("src", "a.txt", ActionKind::Create);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].target_id, "one");
    assert_eq!(results[0].outcome, SyncOutcome::Applied(AppliedOp::Copied));
    assert_eq!(results[1].target_id, "two");
    assert!(results[1].is_failed());
    assert_eq!(fs.contents("/dst/a.txt").unwrap(), b"hello");
}

#[test]
fn unknown_root_yields_nothing() {
    let (_fs, exec) = simple();
    assert!(exec.apply_kind("nope", "a.txt", ActionKind::Create).is_empty());
}
