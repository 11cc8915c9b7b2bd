use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use tokio::sync::mpsc;

use codesync::types::{RawChange, RawKind};
use codesync::watch::{WatchMessage, WatchSource, WatchSubscription};

#[derive(Default)]
struct FakeState {
    senders: HashMap<PathBuf, mpsc::UnboundedSender<WatchMessage>>,
    subscriptions: HashMap<PathBuf, usize>,
    fail_next: HashMap<PathBuf, usize>,
}

/// A [`WatchSource`] driven by the test.
///
/// Each `subscribe` hands out a fresh channel; the test pushes raw changes
/// into the latest one with [`FakeWatchSource::emit`] and can break it with
/// [`FakeWatchSource::break_watch`].
#[derive(Clone, Default)]
pub struct FakeWatchSource {
    state: Arc<Mutex<FakeState>>,
}

impl FakeWatchSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Push a message into the live subscription for `root`. Returns false
    /// if there is none.
    pub fn send(&self, root: impl AsRef<Path>, msg: WatchMessage) -> bool {
        match self.state().senders.get(root.as_ref()) {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn emit(&self, root: impl AsRef<Path>, path: impl AsRef<Path>, kind: RawKind) -> bool {
        self.send(root, WatchMessage::Event(RawChange::new(path.as_ref(), kind)))
    }

    pub fn emit_change(&self, root: impl AsRef<Path>, change: RawChange) -> bool {
        self.send(root, WatchMessage::Event(change))
    }

    pub fn overflow(&self, root: impl AsRef<Path>) -> bool {
        self.send(root, WatchMessage::Overflow)
    }

    /// Close the live subscription for `root`, as a dying OS watch would.
    pub fn break_watch(&self, root: impl AsRef<Path>) {
        self.state().senders.remove(root.as_ref());
    }

    /// Make the next `times` subscribe calls for `root` fail.
    pub fn fail_next_subscribe(&self, root: impl AsRef<Path>, times: usize) {
        self.state()
            .fail_next
            .insert(root.as_ref().to_path_buf(), times);
    }

    /// Successful subscriptions so far for `root`.
    pub fn subscriptions(&self, root: impl AsRef<Path>) -> usize {
        self.state()
            .subscriptions
            .get(root.as_ref())
            .copied()
            .unwrap_or(0)
    }

    pub fn is_live(&self, root: impl AsRef<Path>) -> bool {
        self.state()
            .senders
            .get(root.as_ref())
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl WatchSource for FakeWatchSource {
    fn subscribe(&self, root: &Path) -> anyhow::Result<WatchSubscription> {
        let mut state = self.state();
        if let Some(remaining) = state.fail_next.get_mut(root) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("injected subscribe failure for {:?}", root));
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.senders.insert(root.to_path_buf(), tx);
        *state.subscriptions.entry(root.to_path_buf()).or_default() += 1;
        Ok(WatchSubscription::new(rx, ()))
    }
}
