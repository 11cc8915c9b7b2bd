// src/exec/worker.rs

//! Worker pool draining the shared work queue.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::queue::WorkQueue;
use crate::engine::report::{ReportSink, SupervisorEvent};
use crate::exec::executor::SyncExecutor;
use crate::types::{EffectiveAction, Failure, FailureKind, SyncOutcome, SyncResult};

/// Spawn `count` workers. They exit once the queue is closed and drained.
pub fn spawn_workers(
    count: usize,
    queue: Arc<WorkQueue>,
    executor: Arc<SyncExecutor>,
    sink: Arc<dyn ReportSink>,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|id| {
            let queue = Arc::clone(&queue);
            let executor = Arc::clone(&executor);
            let sink = Arc::clone(&sink);
            tokio::spawn(worker_loop(id, queue, executor, sink))
        })
        .collect()
}

async fn worker_loop(
    id: usize,
    queue: Arc<WorkQueue>,
    executor: Arc<SyncExecutor>,
    sink: Arc<dyn ReportSink>,
) {
    debug!(worker = id, "worker started");

    while let Some(action) = queue.pop().await {
        let key = action.key();
        debug!(worker = id, root = %action.root_id, path = %action.rel_path, kind = %action.kind, "applying");

        // Blocking I/O runs to completion even if the runtime shuts down.
        let job_exec = Arc::clone(&executor);
        let job_action = action.clone();
        let results = match tokio::task::spawn_blocking(move || job_exec.apply(&job_action)).await {
            Ok(results) => results,
            Err(err) => {
                error!(worker = id, path = %action.rel_path, error = %err, "apply task died");
                failed_for_all_targets(&executor, &action, format!("apply task died: {}", err))
            }
        };

        for result in results {
            sink.record(SupervisorEvent::from_result(result));
        }
        queue.complete(&key);
    }

    info!(worker = id, "worker finished (queue closed)");
}

fn failed_for_all_targets(
    executor: &SyncExecutor,
    action: &EffectiveAction,
    message: String,
) -> Vec<SyncResult> {
    let Some(root) = executor.root(&action.root_id) else {
        return Vec::new();
    };
    root.targets
        .iter()
        .map(|target| SyncResult {
            root_id: action.root_id.clone(),
            target_id: target.id.clone(),
            rel_path: action.rel_path.clone(),
            outcome: SyncOutcome::Failed(Failure {
                kind: FailureKind::PermanentIo,
                message: message.clone(),
            }),
            attempts: 0,
        })
        .collect()
}
