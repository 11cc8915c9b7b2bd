// src/watch/watcher.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::fs::meta_from_std;
use crate::types::{FileIdentity, RawChange, RawKind};

/// What a watch subscription delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    Event(RawChange),
    /// Events were lost; the receiver should rescan the whole root.
    Overflow,
    /// The underlying watch reported an error.
    Error(String),
}

/// A live subscription. Dropping it stops the watch.
pub struct WatchSubscription {
    pub events: mpsc::UnboundedReceiver<WatchMessage>,
    _guard: Box<dyn Send>,
}

impl WatchSubscription {
    pub fn new(events: mpsc::UnboundedReceiver<WatchMessage>, guard: impl Send + 'static) -> Self {
        Self {
            events,
            _guard: Box::new(guard),
        }
    }
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription").finish_non_exhaustive()
    }
}

/// Source of raw change notifications for a directory tree.
///
/// Production code uses [`NotifyWatchSource`]; tests inject their own
/// events through a fake implementation.
pub trait WatchSource: Send + Sync {
    fn subscribe(&self, root: &Path) -> Result<WatchSubscription>;
}

/// Recursive OS-level watch backed by `notify`.
#[derive(Debug, Clone, Default)]
pub struct NotifyWatchSource;

impl NotifyWatchSource {
    pub fn new() -> Self {
        Self
    }
}

impl WatchSource for NotifyWatchSource {
    fn subscribe(&self, root: &Path) -> Result<WatchSubscription> {
        // Channel from the blocking notify callback into the async world.
        let (tx, rx) = mpsc::unbounded_channel::<WatchMessage>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let messages = match res {
                    Ok(event) => translate_event(&event),
                    Err(err) => vec![WatchMessage::Error(err.to_string())],
                };
                for msg in messages {
                    // The receiver is gone once the subscription is dropped.
                    if tx.send(msg).is_err() {
                        break;
                    }
                }
            },
            Config::default(),
        )
        .context("creating filesystem watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watching {:?}", root))?;

        info!("file watcher started on {:?}", root);
        Ok(WatchSubscription::new(rx, watcher))
    }
}

fn stat_identity(path: &Path) -> Option<FileIdentity> {
    std::fs::symlink_metadata(path)
        .ok()
        .map(|meta| meta_from_std(&meta).identity())
}

fn change(path: &Path, kind: RawKind) -> WatchMessage {
    let mut raw = RawChange::new(path, kind);
    raw.identity = stat_identity(path);
    WatchMessage::Event(raw)
}

/// Map one `notify` event onto raw changes.
pub fn translate_event(event: &Event) -> Vec<WatchMessage> {
    debug!(?event, "received notify event");

    if event.need_rescan() {
        return vec![WatchMessage::Overflow];
    }

    let paths: &[PathBuf] = &event.paths;
    match event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(_) => paths.iter().map(|p| change(p, RawKind::Created)).collect(),
        EventKind::Remove(_) => paths
            .iter()
            .map(|p| WatchMessage::Event(RawChange::new(p, RawKind::Removed)))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            vec![change(
                &paths[1],
                RawKind::Renamed {
                    from: paths[0].clone(),
                },
            )]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
            .iter()
            .map(|p| WatchMessage::Event(RawChange::new(p, RawKind::RenamedFrom)))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().map(|p| change(p, RawKind::RenamedTo)).collect()
        }
        // Ambiguous events: decide by whether the path still exists.
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|p| {
                if p.symlink_metadata().is_ok() {
                    change(p, RawKind::RenamedTo)
                } else {
                    WatchMessage::Event(RawChange::new(p, RawKind::RenamedFrom))
                }
            })
            .collect(),
        EventKind::Any | EventKind::Other => paths
            .iter()
            .map(|p| {
                if p.symlink_metadata().is_ok() {
                    change(p, RawKind::Modified)
                } else {
                    WatchMessage::Event(RawChange::new(p, RawKind::Removed))
                }
            })
            .collect(),
        EventKind::Modify(_) => paths.iter().map(|p| change(p, RawKind::Modified)).collect(),
    }
}
