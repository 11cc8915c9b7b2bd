// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::RetryPolicy;
use crate::types::{RuleScope, WatchRoot};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// debounce_ms = 200
/// workers = 2
///
/// [[root]]
/// id = "app"
/// path = "/home/me/app"
/// exclude = ["*.tmp", ".git/", { pattern = "build", applies_to = "dirs" }]
/// exclude_file = "excludes.txt"
/// targets = ["/mnt/mirror/app", { id = "backup", path = "/backup/app" }]
/// ```
///
/// This is the unchecked form; [`SyncConfig`] is what the engine runs on.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: EngineSection,

    #[serde(default)]
    pub root: Vec<RootSection>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineSection {
    /// Debounce window per path.
    pub debounce_ms: u64,
    /// How long a removal waits for a matching creation to become a rename.
    pub rename_window_ms: u64,
    /// Executor pool size.
    pub workers: usize,
    pub queue_capacity: usize,
    /// Periodic self-healing reconcile; 0 or absent disables it.
    pub reconcile_interval_secs: Option<u64>,
    /// Total attempts for transient I/O failures.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
    pub restart_backoff_ms: u64,
    pub restart_backoff_max_ms: u64,
    pub shutdown_grace_ms: u64,
    /// Compare content hashes, not just size and mtime.
    pub checksum: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            rename_window_ms: 250,
            workers: 2,
            queue_capacity: 1024,
            reconcile_interval_secs: None,
            max_attempts: 4,
            retry_backoff_ms: 100,
            retry_backoff_max_ms: 2000,
            restart_backoff_ms: 500,
            restart_backoff_max_ms: 30_000,
            shutdown_grace_ms: 5000,
            checksum: false,
        }
    }
}

/// One `[[root]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootSection {
    /// Defaults to `root<N>` (1-based position in the file).
    pub id: Option<String>,
    pub path: PathBuf,
    #[serde(default)]
    pub exclude: Vec<ExcludeSpec>,
    /// Plain-text pattern list, one per line. Expanded by the loader.
    pub exclude_file: Option<PathBuf>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExcludeSpec {
    Pattern(String),
    Rule {
        pattern: String,
        #[serde(default)]
        applies_to: Option<RuleScope>,
    },
}

impl ExcludeSpec {
    pub fn pattern(&self) -> &str {
        match self {
            ExcludeSpec::Pattern(p) => p,
            ExcludeSpec::Rule { pattern, .. } => pattern,
        }
    }

    pub fn scope(&self) -> RuleScope {
        match self {
            ExcludeSpec::Pattern(_) => RuleScope::Both,
            ExcludeSpec::Rule { applies_to, .. } => applies_to.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Path(PathBuf),
    Named { id: String, path: PathBuf },
}

impl TargetSpec {
    pub fn path(&self) -> &PathBuf {
        match self {
            TargetSpec::Path(p) => p,
            TargetSpec::Named { path, .. } => path,
        }
    }
}

/// Engine knobs with units applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub debounce: Duration,
    pub rename_window: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
    pub reconcile_interval: Option<Duration>,
    pub retry: RetryPolicy,
    pub restart_backoff: Duration,
    pub restart_backoff_max: Duration,
    pub shutdown_grace: Duration,
    pub checksum: bool,
}

impl From<&EngineSection> for EngineOptions {
    fn from(s: &EngineSection) -> Self {
        Self {
            debounce: Duration::from_millis(s.debounce_ms),
            rename_window: Duration::from_millis(s.rename_window_ms),
            workers: s.workers,
            queue_capacity: s.queue_capacity,
            reconcile_interval: s
                .reconcile_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            retry: RetryPolicy {
                max_attempts: s.max_attempts,
                base_delay: Duration::from_millis(s.retry_backoff_ms),
                max_delay: Duration::from_millis(s.retry_backoff_max_ms),
            },
            restart_backoff: Duration::from_millis(s.restart_backoff_ms),
            restart_backoff_max: Duration::from_millis(s.restart_backoff_max_ms),
            shutdown_grace: Duration::from_millis(s.shutdown_grace_ms),
            checksum: s.checksum,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions::from(&EngineSection::default())
    }
}

/// Validated configuration: immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub options: EngineOptions,
    pub roots: Vec<WatchRoot>,
}

impl SyncConfig {
    pub fn root(&self, id: &str) -> Option<&WatchRoot> {
        self.roots.iter().find(|r| r.id == id)
    }
}
