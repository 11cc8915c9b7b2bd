// src/engine/root_task.rs

//! One task per watch root: subscribe, normalize, debounce, enqueue.
//!
//! The task owns its normalizer and aggregator outright; the only state it
//! shares with anyone is the work queue. When the watch fails the task tears
//! its state down, reports the failure and re-subscribes with capped
//! exponential backoff. Other roots never notice.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::engine::queue::{QueueClosed, WorkQueue};
use crate::engine::report::{ReportSink, SupervisorEvent};
use crate::engine::supervisor::wait_shutdown;
use crate::fs::FileSystem;
use crate::reconcile::Reconciler;
use crate::types::{
    ActionKind, CanonicalEvent, CanonicalKind, ChangeEvent, EffectiveAction, RawKind, RelPath,
    WatchRoot,
};
use crate::watch::path_utils::{to_destination, to_relative};
use crate::watch::{DebounceAggregator, EventNormalizer, WatchMessage, WatchSource, WatchSubscription};

/// Everything a root task needs, cheap to clone.
#[derive(Clone)]
pub struct RootContext {
    pub root: Arc<WatchRoot>,
    pub source: Arc<dyn WatchSource>,
    pub fs: Arc<dyn FileSystem>,
    pub queue: Arc<WorkQueue>,
    pub reconciler: Reconciler,
    pub sink: Arc<dyn ReportSink>,
    pub debounce: Duration,
    pub rename_window: Duration,
    pub restart_backoff: Duration,
    pub restart_backoff_max: Duration,
}

enum PumpExit {
    Shutdown,
    Failed(String),
}

fn restart_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(max)
}

/// Run the watch for one root until shutdown, re-establishing it on failure.
pub async fn supervise_root(ctx: RootContext, mut shutdown: watch::Receiver<bool>) {
    let root_id = ctx.root.id.clone();
    let mut failures: u32 = 0;
    let mut established_before = false;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let error = match ctx.source.subscribe(&ctx.root.path) {
            Ok(subscription) => {
                failures = 0;
                ctx.sink.record(SupervisorEvent::WatchStarted {
                    root_id: root_id.clone(),
                    path: ctx.root.path.clone(),
                });
                // Whatever happened while we were not watching is unknown.
                if established_before {
                    queue_rescan(&ctx);
                }
                established_before = true;

                match pump(&ctx, subscription, &mut shutdown).await {
                    PumpExit::Shutdown => break,
                    PumpExit::Failed(reason) => reason,
                }
            }
            Err(err) => format!("{:#}", err),
        };

        failures += 1;
        let retry_in = restart_delay(ctx.restart_backoff, ctx.restart_backoff_max, failures);
        ctx.sink.record(SupervisorEvent::WatchFailed {
            root_id: root_id.clone(),
            error,
            retry_in,
        });

        tokio::select! {
            _ = sleep(retry_in) => {}
            _ = wait_shutdown(&mut shutdown) => break,
        }
    }

    info!(root = %root_id, "root task stopped");
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Drive one subscription. Pending windows are always flushed into the
/// queue before returning, whatever the reason.
async fn pump(
    ctx: &RootContext,
    mut subscription: WatchSubscription,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpExit {
    let root = &ctx.root;
    let mut normalizer = EventNormalizer::new(ctx.rename_window);
    let mut aggregator = DebounceAggregator::new(root.id.clone(), ctx.debounce);

    let exit = loop {
        let deadline = earliest(normalizer.next_deadline(), aggregator.next_deadline());

        tokio::select! {
            biased;

            _ = wait_shutdown(shutdown) => break PumpExit::Shutdown,

            msg = subscription.events.recv() => match msg {
                None => break PumpExit::Failed("event stream closed".to_string()),
                Some(WatchMessage::Overflow) => {
                    warn!(root = %root.id, "event overflow, rescanning");
                    queue_rescan(ctx);
                }
                Some(WatchMessage::Error(error)) => {
                    if !ctx.fs.is_dir(&root.path) {
                        break PumpExit::Failed(error);
                    }
                    warn!(root = %root.id, %error, "watch reported an error");
                }
                Some(WatchMessage::Event(raw)) => {
                    let root_gone = raw.path == root.path
                        && matches!(raw.kind, RawKind::Removed | RawKind::RenamedFrom)
                        && !ctx.fs.is_dir(&root.path);
                    if root_gone {
                        break PumpExit::Failed(format!("watch root {:?} was removed", root.path));
                    }
                    let event = ChangeEvent {
                        root_id: root.id.clone(),
                        path: raw.path,
                        kind: raw.kind,
                        identity: raw.identity,
                        observed_at: Instant::now(),
                    };
                    for canonical in normalizer.push(event) {
                        ingest(ctx, &mut aggregator, canonical);
                    }
                }
            },

            _ = sleep_until_opt(deadline) => {}
        }

        let now = Instant::now();
        for canonical in normalizer.expire(now) {
            ingest(ctx, &mut aggregator, canonical);
        }
        dispatch(ctx, aggregator.due(now)).await;
    };

    for canonical in normalizer.flush(Instant::now()) {
        ingest(ctx, &mut aggregator, canonical);
    }
    let pending = aggregator.drain();
    if !pending.is_empty() {
        debug!(root = %root.id, count = pending.len(), "force-closing pending windows");
    }
    dispatch(ctx, pending).await;

    exit
}

/// Resolve, filter, and feed one canonical event to the aggregator.
fn ingest(ctx: &RootContext, aggregator: &mut DebounceAggregator, event: CanonicalEvent) {
    let root = &ctx.root;

    let relative = |path: &Path| -> Option<RelPath> {
        match to_relative(path, &root.path) {
            Ok(rel) if rel.is_empty() => None,
            Ok(rel) => Some(rel),
            Err(err) => {
                warn!(root = %root.id, error = %err, "ignoring event");
                None
            }
        }
    };
    // A vanished source says nothing about the kind; whatever is still
    // mirrored at a destination does.
    let mirrored_kind = |rel: &str| -> Option<bool> {
        root.targets.iter().find_map(|target| {
            let dest = to_destination(rel, target).ok()?;
            ctx.fs.metadata(&dest).ok().flatten().map(|m| m.is_dir())
        })
    };
    let admitted = |rel: &str, abs: &Path| -> bool {
        let is_dir = event
            .is_dir
            .or_else(|| ctx.fs.metadata(abs).ok().flatten().map(|m| m.is_dir()))
            .or_else(|| mirrored_kind(rel));
        let excluded = match is_dir {
            Some(is_dir) => root.matcher.excluded(rel, is_dir),
            None => root.matcher.excluded_any(rel),
        };
        if excluded {
            trace!(root = %root.id, path = %rel, "excluded event dropped");
        }
        !excluded
    };

    match &event.kind {
        CanonicalKind::Renamed { from } => {
            let from_rel = relative(from).filter(|rel| admitted(rel, from));
            let to_rel = relative(&event.path).filter(|rel| admitted(rel, &event.path));
            aggregator.on_rename(from_rel.as_deref(), to_rel.as_deref(), event.at);
        }
        kind => {
            let Some(rel) = relative(&event.path) else {
                return;
            };
            if !admitted(&rel, &event.path) {
                return;
            }
            let kind = match kind {
                CanonicalKind::Created => ActionKind::Create,
                CanonicalKind::Deleted => ActionKind::Delete,
                _ => ActionKind::Modify,
            };
            aggregator.on_event(&rel, kind, event.at);
        }
    }
}

async fn dispatch(ctx: &RootContext, actions: Vec<EffectiveAction>) {
    for action in actions {
        trace!(root = %action.root_id, path = %action.rel_path, kind = %action.kind, "window closed");
        if let Err(QueueClosed(action)) = ctx.queue.push(action).await {
            warn!(root = %action.root_id, path = %action.rel_path, "queue closed, action dropped");
        }
    }
}

/// Plan a reconciliation of the root in the background and push the
/// corrections through the queue.
pub fn queue_rescan(ctx: &RootContext) -> JoinHandle<()> {
    let reconciler = ctx.reconciler.clone();
    let root = Arc::clone(&ctx.root);
    let queue = Arc::clone(&ctx.queue);
    let sink = Arc::clone(&ctx.sink);

    tokio::spawn(async move {
        let plan_root = Arc::clone(&root);
        let plan = match tokio::task::spawn_blocking(move || reconciler.plan(&plan_root)).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(root = %root.id, error = %err, "rescan planning died");
                return;
            }
        };
        for failure in &plan.failures {
            warn!(root = %root.id, path = ?failure.path, error = %failure.message, "rescan entry failed");
        }

        let actions = plan.to_actions(Instant::now());
        let count = actions.len();
        for action in actions {
            if queue.push(action).await.is_err() {
                debug!(root = %root.id, "queue closed during rescan");
                return;
            }
        }
        sink.record(SupervisorEvent::ReconcileQueued {
            root_id: root.id.clone(),
            actions: count,
        });
    })
}
