// src/watch/mod.rs

//! Everything between the OS notifier and the work queue.
//!
//! - [`patterns`]: exclusion rules and the compiled matcher.
//! - [`path_utils`]: absolute ↔ relative ↔ destination path resolution.
//! - [`normalizer`]: raw notifications to canonical events, rename pairing.
//! - [`debounce`]: per-path windows collapsing bursts into one action.
//! - [`watcher`]: the `WatchSource` seam and its `notify` implementation.
//! - [`hash`]: content hashing for the checksum comparison.

pub mod debounce;
pub mod hash;
pub mod normalizer;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use debounce::DebounceAggregator;
pub use normalizer::EventNormalizer;
pub use patterns::{ExclusionMatcher, ExclusionRule};
pub use watcher::{NotifyWatchSource, WatchMessage, WatchSource, WatchSubscription};
