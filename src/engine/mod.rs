// src/engine/mod.rs

//! Orchestration for codesync.
//!
//! This module ties together:
//! - the per-root watch tasks (normalize, debounce, enqueue, restart)
//! - the shared work queue feeding the executor pool
//! - the supervisor owning their lifecycle and shutdown
//! - the reporting sink every outcome is sent to
//!
//! The pure pieces (normalizer, aggregator, executor) live in `watch` and
//! `exec`; this module is the async shell around them.

pub mod queue;
pub mod report;
pub mod root_task;
pub mod supervisor;

pub use queue::{QueueClosed, WorkQueue};
pub use report::{ReportSink, SupervisorEvent, TracingSink};
pub use supervisor::{Supervisor, SupervisorHandle};
