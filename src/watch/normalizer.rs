// src/watch/normalizer.rs

//! Turns raw notifications into canonical events and pairs split renames.
//!
//! A removal whose file identity is known is held back for the rename
//! window. If a creation with the same identity shows up at another path
//! before the window closes, the pair becomes one `Renamed` event;
//! otherwise the removal is released as a plain `Deleted`. Nothing waits
//! longer than the window, and duplicates are passed through untouched.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::types::{CanonicalEvent, CanonicalKind, ChangeEvent, FileIdentity, RawKind};

#[derive(Debug)]
struct PendingRemoval {
    path: PathBuf,
    identity: FileIdentity,
    observed_at: Instant,
    deadline: Instant,
}

#[derive(Debug)]
pub struct EventNormalizer {
    rename_window: Duration,
    /// Last identity seen per path, needed because removal events cannot be
    /// stat'ed after the fact.
    known: HashMap<PathBuf, FileIdentity>,
    pending: VecDeque<PendingRemoval>,
}

impl EventNormalizer {
    pub fn new(rename_window: Duration) -> Self {
        Self {
            rename_window,
            known: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Feed one raw event. Returns the canonical events it releases, in order.
    pub fn push(&mut self, event: ChangeEvent) -> Vec<CanonicalEvent> {
        let mut out = self.expire(event.observed_at);
        let at = event.observed_at;
        let path = event.path;

        // Anything at a path ends a removal held for that same path.
        if let Some(idx) = self.pending.iter().position(|p| p.path == path) {
            if let Some(removal) = self.pending.remove(idx) {
                out.push(Self::deleted(removal, at));
            }
        }

        match event.kind {
            RawKind::Created | RawKind::RenamedTo => {
                let is_dir = event.identity.map(|id| id.is_dir);
                let paired = event.identity.and_then(|id| self.take_matching(&id));
                if let Some(id) = event.identity {
                    self.known.insert(path.clone(), id);
                }
                let kind = match paired {
                    Some(from) => {
                        self.forget_below(&from);
                        CanonicalKind::Renamed { from }
                    }
                    None => CanonicalKind::Created,
                };
                out.push(CanonicalEvent { path, kind, is_dir, at });
            }
            RawKind::Modified => {
                if let Some(id) = event.identity {
                    self.known.insert(path.clone(), id);
                }
                out.push(CanonicalEvent {
                    path,
                    kind: CanonicalKind::Modified,
                    is_dir: event.identity.map(|id| id.is_dir),
                    at,
                });
            }
            RawKind::Removed | RawKind::RenamedFrom => {
                let identity = self.known.remove(&path).or(event.identity);
                self.forget_below(&path);
                match identity {
                    Some(identity) if !self.rename_window.is_zero() => {
                        trace!(path = ?path, "holding removal for rename pairing");
                        self.pending.push_back(PendingRemoval {
                            path,
                            identity,
                            observed_at: at,
                            deadline: at + self.rename_window,
                        });
                    }
                    identity => out.push(CanonicalEvent {
                        path,
                        kind: CanonicalKind::Deleted,
                        is_dir: identity.map(|id| id.is_dir),
                        at,
                    }),
                }
            }
            RawKind::Renamed { from } => {
                if let Some(idx) = self.pending.iter().position(|p| p.path == from) {
                    self.pending.remove(idx);
                }
                let identity = event.identity.or_else(|| self.known.get(&from).copied());
                self.forget_below(&from);
                if let Some(id) = identity {
                    self.known.insert(path.clone(), id);
                }
                out.push(CanonicalEvent {
                    path,
                    kind: CanonicalKind::Renamed { from },
                    is_dir: identity.map(|id| id.is_dir),
                    at,
                });
            }
        }

        out
    }

    /// Release every held removal whose window closed at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<CanonicalEvent> {
        let mut out = Vec::new();
        while self.pending.front().is_some_and(|p| p.deadline <= now) {
            if let Some(removal) = self.pending.pop_front() {
                out.push(Self::deleted(removal, now));
            }
        }
        out
    }

    /// Release all held removals immediately.
    pub fn flush(&mut self, now: Instant) -> Vec<CanonicalEvent> {
        self.pending
            .drain(..)
            .map(|removal| Self::deleted(removal, now))
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().map(|p| p.deadline)
    }

    /// Drop all state, e.g. after the watch was re-established.
    pub fn reset(&mut self) {
        self.known.clear();
        self.pending.clear();
    }

    fn take_matching(&mut self, identity: &FileIdentity) -> Option<PathBuf> {
        let idx = self
            .pending
            .iter()
            .position(|p| p.identity.same_file(identity))?;
        self.pending.remove(idx).map(|p| p.path)
    }

    fn forget_below(&mut self, dir: &Path) {
        self.known.retain(|p, _| !p.starts_with(dir));
    }

    /// A released removal is stamped with the release time, never earlier
    /// than when it was observed.
    fn deleted(removal: PendingRemoval, released_at: Instant) -> CanonicalEvent {
        CanonicalEvent {
            path: removal.path,
            kind: CanonicalKind::Deleted,
            is_dir: Some(removal.identity.is_dir),
            at: released_at.max(removal.observed_at),
        }
    }
}
