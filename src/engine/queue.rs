// src/engine/queue.rs

//! Shared bounded work queue between the root tasks and the worker pool.
//!
//! Semantics:
//! - Capacity counts queued actions (ready + deferred). `push` waits for a
//!   free slot.
//! - While a key is being applied by a worker, a new action for that key is
//!   deferred and only becomes ready once the worker calls `complete`. Two
//!   workers never hold the same key.
//! - A newer action for a key that is already waiting replaces the older
//!   one in place: the queue only ever carries the latest truth per path.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tracing::trace;

use crate::types::{ActionKey, EffectiveAction};

#[derive(Debug, Error)]
#[error("work queue is closed")]
pub struct QueueClosed(pub EffectiveAction);

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<EffectiveAction>,
    in_flight: HashSet<ActionKey>,
    deferred: HashMap<ActionKey, EffectiveAction>,
    closed: bool,
}

impl QueueState {
    /// Replace a waiting action with the same key. Hands the action back if
    /// there was none.
    fn try_replace(&mut self, action: EffectiveAction) -> Result<(), EffectiveAction> {
        let key = action.key();
        if let Some(slot) = self.deferred.get_mut(&key) {
            *slot = action;
            return Ok(());
        }
        if let Some(slot) = self.ready.iter_mut().find(|a| a.key() == key) {
            *slot = action;
            return Ok(());
        }
        Err(action)
    }
}

#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    slots: Semaphore,
    notify: Notify,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            slots: Semaphore::new(capacity.max(1)),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `action`, waiting for capacity if needed.
    pub async fn push(&self, action: EffectiveAction) -> Result<(), QueueClosed> {
        let action = {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueClosed(action));
            }
            match state.try_replace(action) {
                Ok(()) => return Ok(()),
                Err(action) => action,
            }
        };

        let Ok(permit) = self.slots.acquire().await else {
            return Err(QueueClosed(action));
        };

        let mut state = self.lock();
        if state.closed {
            return Err(QueueClosed(action));
        }
        // The key may have shown up while we waited for a slot.
        let action = match state.try_replace(action) {
            Ok(()) => return Ok(()),
            Err(action) => action,
        };

        permit.forget();
        let key = action.key();
        if state.in_flight.contains(&key) {
            trace!(root = %key.0, path = %key.1, "key in flight, deferring");
            state.deferred.insert(key, action);
        } else {
            state.ready.push_back(action);
            self.notify.notify_one();
        }
        Ok(())
    }

    /// Take the next ready action and mark its key in flight. Returns `None`
    /// once the queue is closed and nothing is left to hand out.
    pub async fn pop(&self) -> Option<EffectiveAction> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(action) = state.ready.pop_front() {
                    state.in_flight.insert(action.key());
                    self.slots.add_permits(1);
                    return Some(action);
                }
                if state.closed && state.deferred.is_empty() {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release `key` after its action was applied, promoting a deferred
    /// action for the same key.
    pub fn complete(&self, key: &ActionKey) {
        let mut state = self.lock();
        state.in_flight.remove(key);
        if let Some(action) = state.deferred.remove(key) {
            state.ready.push_back(action);
            self.notify.notify_one();
        } else if state.closed {
            // Workers waiting only on deferred work may now be done.
            self.notify.notify_waiters();
        }
    }

    /// Stop accepting new actions. Already queued actions are still handed out.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.slots.close();
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Queued actions, ready or deferred.
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.ready.len() + state.deferred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.ready.is_empty() && state.deferred.is_empty() && state.in_flight.is_empty()
    }
}
