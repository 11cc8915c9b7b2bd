// src/watch/debounce.rs

//! Per-path debounce windows.
//!
//! Each `(root, relative path)` key has at most one pending action. Every
//! new event for the key merges into it and pushes its deadline out to
//! `now + window`. Time is always passed in, so the aggregator itself never
//! sleeps; the root task asks for [`DebounceAggregator::next_deadline`] and
//! wakes up then.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::{ActionKind, EffectiveAction, RelPath, RootId};

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: ActionKind,
    deadline: Instant,
}

/// Merge a new event kind into a pending one. `None` means the two cancel.
pub fn merge_kinds(current: ActionKind, next: ActionKind) -> Option<ActionKind> {
    use ActionKind::*;
    match (current, next) {
        (Create, Delete) => None,
        (_, Delete) => Some(Delete),
        (Create, Create | Modify) => Some(Create),
        (Modify, Create | Modify) => Some(Modify),
        // Deleted and back again: the destination may still hold the old copy.
        (Delete, Create | Modify) => Some(Modify),
    }
}

#[derive(Debug)]
pub struct DebounceAggregator {
    root_id: RootId,
    window: Duration,
    pending: HashMap<RelPath, Pending>,
}

impl DebounceAggregator {
    pub fn new(root_id: impl Into<RootId>, window: Duration) -> Self {
        Self {
            root_id: root_id.into(),
            window,
            pending: HashMap::new(),
        }
    }

    pub fn on_event(&mut self, rel_path: &str, kind: ActionKind, now: Instant) {
        let deadline = now + self.window;
        match self.pending.get(rel_path).copied() {
            None => {
                self.pending
                    .insert(rel_path.to_string(), Pending { kind, deadline });
            }
            Some(current) => match merge_kinds(current.kind, kind) {
                Some(kind) => {
                    // A window is only ever extended.
                    let deadline = deadline.max(current.deadline);
                    self.pending
                        .insert(rel_path.to_string(), Pending { kind, deadline });
                }
                None => {
                    self.pending.remove(rel_path);
                }
            },
        }
    }

    /// A rename is a delete of the old path plus a create of the new one.
    /// Either side is `None` when it lies outside the root or is excluded.
    pub fn on_rename(&mut self, from: Option<&str>, to: Option<&str>, now: Instant) {
        if let Some(from) = from {
            self.on_event(from, ActionKind::Delete, now);
        }
        if let Some(to) = to {
            self.on_event(to, ActionKind::Create, now);
        }
    }

    /// Remove and return every action whose window closed at or before `now`,
    /// ordered by close time.
    pub fn due(&mut self, now: Instant) -> Vec<EffectiveAction> {
        let keys: Vec<RelPath> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        self.take(keys)
    }

    /// Force-close every window.
    pub fn drain(&mut self) -> Vec<EffectiveAction> {
        let keys: Vec<RelPath> = self.pending.keys().cloned().collect();
        self.take(keys)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    pub fn pending_kind(&self, rel_path: &str) -> Option<ActionKind> {
        self.pending.get(rel_path).map(|p| p.kind)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self, keys: Vec<RelPath>) -> Vec<EffectiveAction> {
        let mut actions: Vec<EffectiveAction> = keys
            .into_iter()
            .filter_map(|key| {
                self.pending.remove(&key).map(|p| EffectiveAction {
                    root_id: self.root_id.clone(),
                    rel_path: key,
                    kind: p.kind,
                    window_close_at: p.deadline,
                })
            })
            .collect();
        actions.sort_by(|a, b| {
            a.window_close_at
                .cmp(&b.window_close_at)
                .then_with(|| a.rel_path.cmp(&b.rel_path))
        });
        actions
    }
}
