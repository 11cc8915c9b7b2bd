// tests/work_queue.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout};

use codesync::engine::WorkQueue;
use codesync::types::{ActionKind, EffectiveAction};

mod common;
use crate::common::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const SHORT: Duration = Duration::from_millis(50);

fn action(path: &str, kind: ActionKind) -> EffectiveAction {
    EffectiveAction {
        root_id: "src".to_string(),
        rel_path: path.to_string(),
        kind,
        window_close_at: Instant::now(),
    }
}

#[tokio::test]
async fn pops_in_push_order() -> TestResult {
    let q = WorkQueue::new(8);
    q.push(action("a", ActionKind::Modify)).await?;
    q.push(action("b", ActionKind::Create)).await?;
    q.push(action("c", ActionKind::Delete)).await?;

    let order: Vec<String> = [q.pop().await, q.pop().await, q.pop().await]
        .into_iter()
        .flatten()
        .map(|a| a.rel_path)
        .collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    Ok(())
}

#[tokio::test]
async fn waiting_action_is_replaced_by_newer_one() -> TestResult {
    let q = WorkQueue::new(8);
    q.push(action("a", ActionKind::Modify)).await?;
    q.push(action("a", ActionKind::Delete)).await?;
    assert_eq!(q.len(), 1);

    let popped = q.pop().await.ok_or("queue empty")?;
    assert_eq!(popped.kind, ActionKind::Delete);
    Ok(())
}

#[tokio::test]
async fn same_key_is_never_handed_out_twice_concurrently() -> TestResult {
    init_tracing();
    let q = WorkQueue::new(8);
    q.push(action("a", ActionKind::Modify)).await?;
    let first = q.pop().await.ok_or("queue empty")?;

    q.push(action("a", ActionKind::Delete)).await?;
    q.push(action("b", ActionKind::Modify)).await?;

    // "b" is free to go, the second "a" waits for the first to complete.
    let next = q.pop().await.ok_or("queue empty")?;
    assert_eq!(next.rel_path, "b");
    assert!(timeout(SHORT, q.pop()).await.is_err(), "a is still in flight");

    q.complete(&first.key());
    let deferred = timeout(SHORT, q.pop()).await?.ok_or("queue empty")?;
    assert_eq!(deferred.rel_path, "a");
    assert_eq!(deferred.kind, ActionKind::Delete);
    Ok(())
}

#[tokio::test]
async fn deferred_action_is_replaced_too() -> TestResult {
    let q = WorkQueue::new(8);
    q.push(action("a", ActionKind::Modify)).await?;
    let first = q.pop().await.ok_or("queue empty")?;

    q.push(action("a", ActionKind::Delete)).await?;
    q.push(action("a", ActionKind::Create)).await?;
    assert_eq!(q.len(), 1);

    q.complete(&first.key());
    assert_eq!(q.pop().await.ok_or("queue empty")?.kind, ActionKind::Create);
    Ok(())
}

#[tokio::test]
async fn push_waits_for_capacity() -> TestResult {
    let q = Arc::new(WorkQueue::new(1));
    q.push(action("a", ActionKind::Modify)).await?;
    assert!(timeout(SHORT, q.push(action("b", ActionKind::Modify))).await.is_err());

    // Pushing a key that is already queued needs no slot.
    timeout(SHORT, q.push(action("a", ActionKind::Delete))).await??;

    let pusher = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.push(action("b", ActionKind::Modify)).await })
    };
    let a = q.pop().await.ok_or("queue empty")?;
    assert_eq!(a.kind, ActionKind::Delete);
    timeout(Duration::from_secs(1), pusher).await???;
    assert_eq!(q.len(), 1);
    Ok(())
}

#[tokio::test]
async fn close_rejects_pushes_and_drains_the_rest() -> TestResult {
    let q = WorkQueue::new(8);
    q.push(action("a", ActionKind::Modify)).await?;
    q.close();
    assert!(q.is_closed());

    let err = q.push(action("b", ActionKind::Modify)).await.unwrap_err();
    assert_eq!(err.0.rel_path, "b");

    let a = q.pop().await.ok_or("queue empty")?;
    q.complete(&a.key());
    assert!(q.pop().await.is_none());
    assert!(q.is_idle());
    Ok(())
}

#[tokio::test]
async fn close_wakes_idle_workers() -> TestResult {
    let q = Arc::new(WorkQueue::new(8));
    let worker = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.pop().await })
    };
    tokio::time::sleep(SHORT).await;
    q.close();
    let popped = timeout(Duration::from_secs(1), worker).await??;
    assert!(popped.is_none());
    Ok(())
}
