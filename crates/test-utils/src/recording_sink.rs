use std::sync::{Arc, Mutex};

use codesync::engine::{ReportSink, SupervisorEvent};
use codesync::reconcile::ReconcileSummary;
use codesync::types::{SyncOutcome, SyncResult};

/// A [`ReportSink`] that keeps every record for later assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SupervisorEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SupervisorEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Every terminal action result, in arrival order.
    pub fn results(&self) -> Vec<SyncResult> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SupervisorEvent::ActionApplied(r)
                | SupervisorEvent::ActionSkipped(r)
                | SupervisorEvent::ActionFailed(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn results_for(&self, rel_path: &str) -> Vec<SyncResult> {
        self.results()
            .into_iter()
            .filter(|r| r.rel_path == rel_path)
            .collect()
    }

    /// Results for `rel_path` that actually touched the destination.
    pub fn applied_for(&self, rel_path: &str) -> Vec<SyncResult> {
        self.results_for(rel_path)
            .into_iter()
            .filter(|r| matches!(r.outcome, SyncOutcome::Applied(_)))
            .collect()
    }

    pub fn failures(&self) -> Vec<SyncResult> {
        self.results().into_iter().filter(|r| r.is_failed()).collect()
    }

    pub fn reconcile_summaries(&self) -> Vec<ReconcileSummary> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SupervisorEvent::ReconcileSummary(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn watch_started(&self, root_id: &str) -> usize {
        self.count(|e| matches!(e, SupervisorEvent::WatchStarted { root_id: id, .. } if id == root_id))
    }

    pub fn watch_failed(&self, root_id: &str) -> usize {
        self.count(|e| matches!(e, SupervisorEvent::WatchFailed { root_id: id, .. } if id == root_id))
    }

    pub fn reconcile_queued(&self, root_id: &str) -> usize {
        self.count(
            |e| matches!(e, SupervisorEvent::ReconcileQueued { root_id: id, .. } if id == root_id),
        )
    }

    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&SupervisorEvent) -> bool,
    {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl ReportSink for RecordingSink {
    fn record(&self, event: SupervisorEvent) {
        self.events.lock().unwrap().push(event);
    }
}
