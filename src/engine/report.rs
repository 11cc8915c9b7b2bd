// src/engine/report.rs

//! Structured records emitted by the supervisor and where they go.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::reconcile::ReconcileSummary;
use crate::types::{AppliedOp, RootId, SyncOutcome, SyncResult};

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    WatchStarted {
        root_id: RootId,
        path: std::path::PathBuf,
    },
    WatchFailed {
        root_id: RootId,
        error: String,
        retry_in: Duration,
    },
    ActionApplied(SyncResult),
    ActionSkipped(SyncResult),
    ActionFailed(SyncResult),
    ReconcileSummary(ReconcileSummary),
    /// A rescan found drift and queued `actions` corrective actions.
    ReconcileQueued {
        root_id: RootId,
        actions: usize,
    },
}

impl SupervisorEvent {
    /// Wrap a terminal result in the matching record.
    pub fn from_result(result: SyncResult) -> Self {
        match result.outcome {
            SyncOutcome::Applied(_) => SupervisorEvent::ActionApplied(result),
            SyncOutcome::Skipped(_) => SupervisorEvent::ActionSkipped(result),
            SyncOutcome::Failed(_) => SupervisorEvent::ActionFailed(result),
        }
    }
}

/// Consumer of supervisor records. Implementations must not block.
pub trait ReportSink: Send + Sync {
    fn record(&self, event: SupervisorEvent);
}

/// Default sink: one structured log line per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn record(&self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::WatchStarted { root_id, path } => {
                info!(event = "watch_started", root = %root_id, path = ?path, "watching");
            }
            SupervisorEvent::WatchFailed {
                root_id,
                error,
                retry_in,
            } => {
                warn!(event = "watch_failed", root = %root_id, %error, ?retry_in, "watch failed");
            }
            SupervisorEvent::ActionApplied(r) => {
                let op = match r.outcome {
                    SyncOutcome::Applied(AppliedOp::Copied) => "copied",
                    SyncOutcome::Applied(AppliedOp::CopiedTree { .. }) => "copied_tree",
                    SyncOutcome::Applied(AppliedOp::Unchanged) => "unchanged",
                    SyncOutcome::Applied(AppliedOp::Removed) => "removed",
                    SyncOutcome::Applied(AppliedOp::AlreadyAbsent) => "already_absent",
                    _ => "applied",
                };
                info!(
                    event = "action_applied",
                    root = %r.root_id,
                    target = %r.target_id,
                    path = %r.rel_path,
                    op,
                    attempts = r.attempts,
                );
            }
            SupervisorEvent::ActionSkipped(r) => {
                tracing::debug!(
                    event = "action_skipped",
                    root = %r.root_id,
                    target = %r.target_id,
                    path = %r.rel_path,
                    reason = ?r.outcome,
                );
            }
            SupervisorEvent::ActionFailed(r) => {
                let error = match &r.outcome {
                    SyncOutcome::Failed(f) => format!("{:?}: {}", f.kind, f.message),
                    other => format!("{:?}", other),
                };
                error!(
                    event = "action_failed",
                    root = %r.root_id,
                    target = %r.target_id,
                    path = %r.rel_path,
                    attempts = r.attempts,
                    %error,
                );
            }
            SupervisorEvent::ReconcileSummary(s) => {
                info!(
                    event = "reconcile_summary",
                    root = %s.root_id,
                    scanned = s.scanned,
                    copied = s.copied,
                    removed = s.removed,
                    up_to_date = s.up_to_date,
                    pruned = s.pruned,
                    failures = s.failures.len(),
                );
                for f in &s.failures {
                    warn!(event = "reconcile_failure", root = %s.root_id, path = ?f.path, error = %f.message);
                }
            }
            SupervisorEvent::ReconcileQueued { root_id, actions } => {
                info!(event = "reconcile_queued", root = %root_id, actions, "rescan queued corrections");
            }
        }
    }
}
