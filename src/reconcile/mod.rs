// src/reconcile/mod.rs

//! Full-tree reconciliation: bring every destination of a root to the
//! source's state, then remove destination entries the source no longer has.
//!
//! Planning is separate from applying. At startup the plan is applied
//! directly; later rescans turn it into queue actions so they serialize with
//! incremental events for the same paths.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::exec::SyncExecutor;
use crate::fs::EntryKind;
use crate::fs::walk::{Descend, WalkEntry, walk_tree};
use crate::types::{
    ActionKind, AppliedOp, EffectiveAction, RelPath, RootId, SyncOutcome, TargetId, WatchRoot,
};
use crate::watch::path_utils::to_destination;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub root_id: RootId,
    /// Non-excluded source entries seen.
    pub scanned: usize,
    pub copied: usize,
    pub removed: usize,
    pub up_to_date: usize,
    /// Excluded source entries (a pruned directory counts once).
    pub pruned: usize,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedOp {
    /// Destination is missing or stale.
    Copy,
    /// Destination entry has no non-excluded source counterpart.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub target_id: TargetId,
    pub rel_path: RelPath,
    pub op: PlannedOp,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub root_id: RootId,
    pub actions: Vec<PlannedAction>,
    pub scanned: usize,
    pub pruned: usize,
    pub up_to_date: usize,
    pub failures: Vec<ReconcileFailure>,
    /// Source entries whose names cannot be mirrored. They are reported,
    /// not treated as failures.
    pub unrepresentable: Vec<PathBuf>,
}

impl ReconcilePlan {
    /// Collapse per-target operations into one queue action per path.
    pub fn to_actions(&self, now: Instant) -> Vec<EffectiveAction> {
        let mut by_path: BTreeMap<&str, ActionKind> = BTreeMap::new();
        for planned in &self.actions {
            let kind = match planned.op {
                PlannedOp::Copy => ActionKind::Modify,
                PlannedOp::Remove => ActionKind::Delete,
            };
            by_path
                .entry(planned.rel_path.as_str())
                .and_modify(|k| {
                    if kind == ActionKind::Modify {
                        *k = kind;
                    }
                })
                .or_insert(kind);
        }
        by_path
            .into_iter()
            .map(|(rel, kind)| EffectiveAction {
                root_id: self.root_id.clone(),
                rel_path: rel.to_string(),
                kind,
                window_close_at: now,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    executor: Arc<SyncExecutor>,
}

impl Reconciler {
    pub fn new(executor: Arc<SyncExecutor>) -> Self {
        Self { executor }
    }

    /// Compare source and destinations without touching anything.
    pub fn plan(&self, root: &WatchRoot) -> ReconcilePlan {
        let fs = self.executor.fs().as_ref();
        let mut plan = ReconcilePlan {
            root_id: root.id.clone(),
            ..Default::default()
        };

        // Source side, pruned by the matcher.
        let mut sources: Vec<WalkEntry> = Vec::new();
        let report = walk_tree(fs, &root.path, "", |entry| {
            if root.matcher.excluded(&entry.rel, entry.meta.is_dir()) {
                plan.pruned += 1;
                return Descend::No;
            }
            sources.push(entry.clone());
            Descend::Yes
        });
        plan.scanned = sources.len();
        // An incomplete source listing would make unseen entries look orphaned.
        let source_complete = report.is_complete();
        for path in &report.unrepresentable {
            warn!(root = %root.id, path = ?path, "name is not valid UTF-8, not mirrored");
        }
        plan.unrepresentable = report.unrepresentable;
        plan.failures
            .extend(report.errors.into_iter().map(|e| ReconcileFailure {
                path: e.path,
                message: e.message,
            }));

        let source_kinds: HashMap<&str, EntryKind> = sources
            .iter()
            .map(|e| (e.rel.as_str(), e.meta.kind))
            .collect();

        for target in &root.targets {
            let mut planned_dirs: Vec<&str> = Vec::new();

            for entry in &sources {
                if planned_dirs
                    .iter()
                    .any(|d| entry.rel.starts_with(d) && entry.rel.as_bytes().get(d.len()) == Some(&b'/'))
                {
                    continue;
                }
                let dest = match to_destination(&entry.rel, target) {
                    Ok(dest) => dest,
                    Err(err) => {
                        plan.failures.push(ReconcileFailure {
                            path: entry.abs.clone(),
                            message: err.to_string(),
                        });
                        continue;
                    }
                };
                let dest_meta = match fs.metadata(&dest) {
                    Ok(meta) => meta,
                    Err(err) => {
                        plan.failures.push(ReconcileFailure {
                            path: dest,
                            message: format!("{:#}", err),
                        });
                        continue;
                    }
                };

                let stale = match (entry.meta.kind, dest_meta) {
                    (EntryKind::Symlink, _) => false,
                    (EntryKind::Dir, Some(dm)) => !dm.is_dir(),
                    (EntryKind::Dir, None) => true,
                    (EntryKind::File, Some(dm)) => {
                        match self.executor.is_up_to_date(&entry.abs, &entry.meta, &dest, &dm) {
                            Ok(true) => {
                                plan.up_to_date += 1;
                                false
                            }
                            Ok(false) => true,
                            Err(err) => {
                                debug!(path = %entry.rel, error = %format!("{:#}", err), "compare failed, recopying");
                                true
                            }
                        }
                    }
                    (EntryKind::File, None) => true,
                };

                if stale {
                    if entry.meta.is_dir() {
                        planned_dirs.push(&entry.rel);
                    }
                    plan.actions.push(PlannedAction {
                        target_id: target.id.clone(),
                        rel_path: entry.rel.clone(),
                        op: PlannedOp::Copy,
                    });
                }
            }

            // Orphans. Excluded destination entries are left alone.
            if !source_complete {
                warn!(root = %root.id, target = %target.id, "source walk incomplete, skipping orphan removal");
                continue;
            }
            if !fs.is_dir(&target.path) {
                continue;
            }
            // Destination names that cannot be expressed are never judged
            // orphans; the walk sets them aside.
            let orphan_walk = walk_tree(fs, &target.path, "", |entry| {
                if root.matcher.excluded(&entry.rel, entry.meta.is_dir()) {
                    return Descend::No;
                }
                match source_kinds.get(entry.rel.as_str()) {
                    None => {
                        plan.actions.push(PlannedAction {
                            target_id: target.id.clone(),
                            rel_path: entry.rel.clone(),
                            op: PlannedOp::Remove,
                        });
                        Descend::No
                    }
                    Some(EntryKind::Dir) if entry.meta.is_dir() => Descend::Yes,
                    // Type mismatch is fixed by the copy planned above.
                    Some(_) => Descend::No,
                }
            });
            plan.failures
                .extend(orphan_walk.errors.into_iter().map(|e| ReconcileFailure {
                    path: e.path,
                    message: e.message,
                }));
        }

        plan
    }

    /// Plan and apply directly. Per-entry failures are collected, never fatal.
    pub fn reconcile(&self, root: &WatchRoot) -> ReconcileSummary {
        let plan = self.plan(root);
        let mut summary = ReconcileSummary {
            root_id: root.id.clone(),
            scanned: plan.scanned,
            up_to_date: plan.up_to_date,
            pruned: plan.pruned,
            failures: plan.failures,
            ..Default::default()
        };

        for planned in &plan.actions {
            let Some(target) = root.target(&planned.target_id) else {
                continue;
            };
            let kind = match planned.op {
                PlannedOp::Copy => ActionKind::Modify,
                PlannedOp::Remove => ActionKind::Delete,
            };
            let result = self
                .executor
                .apply_to_target(root, target, &planned.rel_path, kind);
            match result.outcome {
                SyncOutcome::Applied(AppliedOp::Copied | AppliedOp::CopiedTree { .. }) => {
                    summary.copied += 1
                }
                SyncOutcome::Applied(AppliedOp::Removed) => summary.removed += 1,
                SyncOutcome::Applied(AppliedOp::Unchanged) => summary.up_to_date += 1,
                SyncOutcome::Applied(AppliedOp::AlreadyAbsent) | SyncOutcome::Skipped(_) => {}
                SyncOutcome::Failed(failure) => summary.failures.push(ReconcileFailure {
                    path: target.path.join(&planned.rel_path),
                    message: failure.message,
                }),
            }
        }

        info!(
            root = %summary.root_id,
            copied = summary.copied,
            removed = summary.removed,
            failures = summary.failures.len(),
            "reconcile finished"
        );
        summary
    }
}
