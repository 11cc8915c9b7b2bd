// tests/supervisor_scenarios.rs
//
// Whole-daemon scenarios on a real temp directory, with a scripted watch
// source standing in for the OS.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::{TempDir, tempdir};
use tokio::task::JoinHandle;

use codesync::config::SyncConfig;
use codesync::engine::{Supervisor, SupervisorHandle};
use codesync::errors::CodesyncError;
use codesync::fs::RealFileSystem;
use codesync::types::{AppliedOp, RawKind, SyncOutcome};

mod common;
use crate::common::{
    ConfigBuilder, FakeWatchSource, RecordingSink, RootBuilder, TestResult, init_tracing,
    read_file, wait_until, with_timeout, write_file,
};

struct Daemon {
    handle: SupervisorHandle,
    task: JoinHandle<codesync::errors::Result<()>>,
    watch: FakeWatchSource,
    sink: RecordingSink,
}

impl Daemon {
    fn start(config: SyncConfig) -> Self {
        init_tracing();
        let watch = FakeWatchSource::new();
        let sink = RecordingSink::new();
        let supervisor = Supervisor::new(
            config,
            Arc::new(RealFileSystem),
            Arc::new(watch.clone()),
            Arc::new(sink.clone()),
        );
        let handle = supervisor.handle();
        let task = tokio::spawn(supervisor.run());
        Self {
            handle,
            task,
            watch,
            sink,
        }
    }

    async fn stop(self) -> TestResult {
        self.handle.shutdown();
        with_timeout(self.task).await??;
        Ok(())
    }
}

/// `<tmp>/src` and `<tmp>/dst`, both existing.
fn layout() -> (TempDir, PathBuf, PathBuf) {
    let tmp = tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    fs::create_dir_all(&src).expect("mkdir src");
    fs::create_dir_all(&dst).expect("mkdir dst");
    (tmp, src, dst)
}

fn has_content(path: &Path, want: &str) -> bool {
    read_file(path).as_deref() == Some(want)
}

/// Long enough for several debounce windows at the test defaults.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn excluded_files_stay_out_and_deletes_propagate() -> TestResult {
    let (_tmp, src, dst) = layout();
    let config = ConfigBuilder::new()
        .root(RootBuilder::new("src", &src).exclude("*.tmp").target("dst", &dst))
        .build();
    let d = Daemon::start(config);
    wait_until("watch attached", || d.watch.is_live(&src)).await;

    write_file(src.join("a.txt"), "hello");
    d.watch.emit(&src, src.join("a.txt"), RawKind::Created);
    wait_until("a.txt mirrored", || has_content(&dst.join("a.txt"), "hello")).await;

    write_file(src.join("a.tmp"), "x");
    d.watch.emit(&src, src.join("a.tmp"), RawKind::Created);
    settle().await;
    assert!(!dst.join("a.tmp").exists());
    assert!(d.sink.results_for("a.tmp").is_empty(), "excluded events never reach the executor");

    fs::remove_file(src.join("a.txt"))?;
    d.watch.emit(&src, src.join("a.txt"), RawKind::Removed);
    wait_until("a.txt removed", || !dst.join("a.txt").exists()).await;

    assert!(d.sink.failures().is_empty(), "{:?}", d.sink.failures());
    d.stop().await
}

#[tokio::test]
async fn delete_of_file_named_like_a_dir_rule_propagates() -> TestResult {
    let (_tmp, src, dst) = layout();
    write_file(src.join("build"), "not a directory");
    let config = ConfigBuilder::new()
        .root(RootBuilder::new("src", &src).exclude("build/").target("dst", &dst))
        .build();
    let d = Daemon::start(config);
    wait_until("watch attached", || d.watch.is_live(&src)).await;
    assert!(
        has_content(&dst.join("build"), "not a directory"),
        "a dir-only rule leaves the file alone"
    );

    fs::remove_file(src.join("build"))?;
    d.watch.emit(&src, src.join("build"), RawKind::Removed);
    wait_until("build removed", || !dst.join("build").exists()).await;

    let results = d.sink.results_for("build");
    assert_eq!(results.len(), 1, "{results:?}");
    assert_eq!(results[0].outcome, SyncOutcome::Applied(AppliedOp::Removed));
    d.stop().await
}

#[tokio::test]
async fn delete_then_recreate_applies_once_with_final_content() -> TestResult {
    let (_tmp, src, dst) = layout();
    write_file(src.join("b.txt"), "v1");
    let config = ConfigBuilder::new()
        .debounce_ms(150)
        .root(RootBuilder::new("src", &src).target("dst", &dst))
        .build();
    let d = Daemon::start(config);
    wait_until("watch attached", || d.watch.is_live(&src)).await;
    assert!(has_content(&dst.join("b.txt"), "v1"), "startup reconcile copied b.txt");

    fs::remove_file(src.join("b.txt"))?;
    d.watch.emit(&src, src.join("b.txt"), RawKind::Removed);
    write_file(src.join("b.txt"), "v2, rewritten");
    d.watch.emit(&src, src.join("b.txt"), RawKind::Created);

    wait_until("b.txt updated", || has_content(&dst.join("b.txt"), "v2, rewritten")).await;
    settle().await;

    let results = d.sink.results_for("b.txt");
    assert_eq!(results.len(), 1, "{results:?}");
    assert_eq!(results[0].outcome, SyncOutcome::Applied(AppliedOp::Copied));
    d.stop().await
}

#[tokio::test]
async fn bursts_collapse_and_short_lived_files_never_appear() -> TestResult {
    let (_tmp, src, dst) = layout();
    let config = ConfigBuilder::new()
        .debounce_ms(100)
        .root(RootBuilder::new("src", &src).target("dst", &dst))
        .build();
    let d = Daemon::start(config);
    wait_until("watch attached", || d.watch.is_live(&src)).await;

    write_file(src.join("main.rs"), "fn main() {}");
    for _ in 0..5 {
        d.watch.emit(&src, src.join("main.rs"), RawKind::Modified);
    }
    write_file(src.join("scratch.swp"), "x");
    d.watch.emit(&src, src.join("scratch.swp"), RawKind::Created);
    fs::remove_file(src.join("scratch.swp"))?;
    d.watch.emit(&src, src.join("scratch.swp"), RawKind::Removed);

    wait_until("main.rs mirrored", || dst.join("main.rs").exists()).await;
    settle().await;

    assert_eq!(d.sink.results_for("main.rs").len(), 1);
    assert!(d.sink.results_for("scratch.swp").is_empty());
    assert!(!dst.join("scratch.swp").exists());
    d.stop().await
}

#[tokio::test]
async fn rename_moves_the_destination_entry() -> TestResult {
    let (_tmp, src, dst) = layout();
    write_file(src.join("old.rs"), "mod x;");
    let config = ConfigBuilder::new()
        .root(RootBuilder::new("src", &src).target("dst", &dst))
        .build();
    let d = Daemon::start(config);
    wait_until("watch attached", || d.watch.is_live(&src)).await;

    fs::rename(src.join("old.rs"), src.join("new.rs"))?;
    d.watch.emit(
        &src,
        src.join("new.rs"),
        RawKind::Renamed {
            from: src.join("old.rs"),
        },
    );

    wait_until("rename mirrored", || {
        has_content(&dst.join("new.rs"), "mod x;") && !dst.join("old.rs").exists()
    })
    .await;
    d.stop().await
}

#[tokio::test]
async fn shutdown_flushes_open_windows() -> TestResult {
    let (_tmp, src, dst) = layout();
    let config = ConfigBuilder::new()
        .debounce_ms(60_000)
        .root(RootBuilder::new("src", &src).target("dst", &dst))
        .build();
    let d = Daemon::start(config);
    wait_until("watch attached", || d.watch.is_live(&src)).await;

    write_file(src.join("late.txt"), "flushed");
    d.watch.emit(&src, src.join("late.txt"), RawKind::Created);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!dst.join("late.txt").exists(), "window is still open");

    let sink = d.sink.clone();
    d.stop().await?;
    assert!(has_content(&dst.join("late.txt"), "flushed"));
    assert_eq!(sink.applied_for("late.txt").len(), 1);
    Ok(())
}

#[tokio::test]
async fn broken_watch_is_restarted_without_disturbing_other_roots() -> TestResult {
    let tmp = tempdir()?;
    let (a_src, a_dst) = (tmp.path().join("a/src"), tmp.path().join("a/dst"));
    let (b_src, b_dst) = (tmp.path().join("b/src"), tmp.path().join("b/dst"));
    for dir in [&a_src, &a_dst, &b_src, &b_dst] {
        fs::create_dir_all(dir)?;
    }

    let config = ConfigBuilder::new()
        .root(RootBuilder::new("a", &a_src).target("dst", &a_dst))
        .root(RootBuilder::new("b", &b_src).target("dst", &b_dst))
        .build();
    let d = Daemon::start(config);
    wait_until("both watches attached", || {
        d.watch.is_live(&a_src) && d.watch.is_live(&b_src)
    })
    .await;

    d.watch.break_watch(&a_src);
    // Changed while nobody was looking.
    write_file(a_src.join("missed.txt"), "caught by rescan");

    write_file(b_src.join("b.txt"), "b");
    d.watch.emit(&b_src, b_src.join("b.txt"), RawKind::Created);
    wait_until("b keeps syncing", || has_content(&b_dst.join("b.txt"), "b")).await;

    wait_until("a re-subscribed", || d.watch.subscriptions(&a_src) == 2).await;
    wait_until("rescan fixed a", || {
        has_content(&a_dst.join("missed.txt"), "caught by rescan")
    })
    .await;

    assert!(d.sink.watch_failed("a") >= 1);
    assert_eq!(d.sink.watch_started("a"), 2);
    assert!(d.sink.reconcile_queued("a") >= 1);
    assert_eq!(d.sink.watch_failed("b"), 0);
    assert_eq!(d.watch.subscriptions(&b_src), 1);
    d.stop().await
}

#[tokio::test]
async fn failed_subscribe_is_retried_with_backoff() -> TestResult {
    let (_tmp, src, dst) = layout();
    let config = ConfigBuilder::new()
        .root(RootBuilder::new("src", &src).target("dst", &dst))
        .build();

    init_tracing();
    let watch = FakeWatchSource::new();
    watch.fail_next_subscribe(&src, 2);
    let sink = RecordingSink::new();
    let supervisor = Supervisor::new(
        config,
        Arc::new(RealFileSystem),
        Arc::new(watch.clone()),
        Arc::new(sink.clone()),
    );
    let handle = supervisor.handle();
    let task = tokio::spawn(supervisor.run());

    wait_until("watch attached", || sink.watch_started("src") == 1).await;
    assert_eq!(sink.watch_failed("src"), 2);
    assert_eq!(sink.reconcile_queued("src"), 0, "first attach follows the startup reconcile");

    handle.shutdown();
    with_timeout(task).await??;
    Ok(())
}

#[tokio::test]
async fn overflow_triggers_a_rescan() -> TestResult {
    let (_tmp, src, dst) = layout();
    let config = ConfigBuilder::new()
        .root(RootBuilder::new("src", &src).target("dst", &dst))
        .build();
    let d = Daemon::start(config);
    wait_until("watch attached", || d.watch.is_live(&src)).await;

    write_file(src.join("dropped/event.txt"), "lost notification");
    d.watch.overflow(&src);

    wait_until("rescan copied it", || {
        has_content(&dst.join("dropped/event.txt"), "lost notification")
    })
    .await;
    assert!(d.sink.reconcile_queued("src") >= 1);
    d.stop().await
}

#[tokio::test]
async fn periodic_reconcile_heals_drift() -> TestResult {
    let (_tmp, src, dst) = layout();
    let config = ConfigBuilder::new()
        .reconcile_every(Duration::from_millis(100))
        .root(RootBuilder::new("src", &src).target("dst", &dst))
        .build();
    let d = Daemon::start(config);
    wait_until("watch attached", || d.watch.is_live(&src)).await;

    write_file(src.join("quiet.txt"), "no event");
    write_file(dst.join("leftover.txt"), "orphan");

    wait_until("drift healed", || {
        has_content(&dst.join("quiet.txt"), "no event") && !dst.join("leftover.txt").exists()
    })
    .await;
    d.stop().await
}

#[tokio::test]
async fn startup_reconcile_is_reported() -> TestResult {
    let (_tmp, src, dst) = layout();
    write_file(src.join("one.txt"), "1");
    write_file(src.join("two/three.txt"), "3");
    write_file(dst.join("orphan.txt"), "x");

    let config = ConfigBuilder::new()
        .root(RootBuilder::new("src", &src).target("dst", &dst))
        .build();
    let d = Daemon::start(config);
    wait_until("watch attached", || d.watch.is_live(&src)).await;

    let summaries = d.sink.reconcile_summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].copied, 2);
    assert_eq!(summaries[0].removed, 1);
    assert!(summaries[0].is_clean());
    assert!(!dst.join("orphan.txt").exists());
    d.stop().await
}

#[tokio::test]
async fn missing_root_is_fatal_at_startup() -> TestResult {
    let tmp = tempdir()?;
    let config = ConfigBuilder::new()
        .root(RootBuilder::new("gone", tmp.path().join("nope")).target("dst", tmp.path().join("dst")))
        .build();
    let supervisor = Supervisor::new(
        config,
        Arc::new(RealFileSystem),
        Arc::new(FakeWatchSource::new()),
        Arc::new(RecordingSink::new()),
    );

    let err = with_timeout(supervisor.run()).await.unwrap_err();
    match err {
        CodesyncError::ConfigError(msg) => assert!(msg.contains("does not exist"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn reconcile_once_returns_summaries() -> TestResult {
    let (_tmp, src, dst) = layout();
    write_file(src.join("x.txt"), "x");
    let config = ConfigBuilder::new()
        .root(RootBuilder::new("src", &src).target("dst", &dst))
        .build();
    let sink = RecordingSink::new();
    let supervisor = Supervisor::new(
        config,
        Arc::new(RealFileSystem),
        Arc::new(FakeWatchSource::new()),
        Arc::new(sink.clone()),
    );

    let summaries = supervisor.reconcile_once().await?;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].copied, 1);
    assert_eq!(sink.reconcile_summaries(), summaries);
    assert!(has_content(&dst.join("x.txt"), "x"));
    Ok(())
}
