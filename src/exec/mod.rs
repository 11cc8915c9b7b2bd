// src/exec/mod.rs

//! Sync execution layer.
//!
//! - [`executor`] applies one effective action to every target of a root.
//! - [`retry`] classifies I/O errors and retries transient ones with backoff.
//! - [`worker`] runs the worker pool that drains the shared work queue.

pub mod executor;
pub mod retry;
pub mod worker;

pub use executor::SyncExecutor;
pub use retry::{ErrorClass, RetryPolicy};
pub use worker::spawn_workers;
