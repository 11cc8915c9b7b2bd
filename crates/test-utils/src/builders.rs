#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use codesync::config::{EngineOptions, SyncConfig};
use codesync::exec::RetryPolicy;
use codesync::types::{RuleScope, SyncTarget, WatchRoot};
use codesync::watch::{ExclusionMatcher, ExclusionRule};

/// Builder for a [`WatchRoot`] to simplify test setup.
pub struct RootBuilder {
    id: String,
    path: PathBuf,
    rules: Vec<(String, RuleScope)>,
    targets: Vec<(String, PathBuf)>,
}

impl RootBuilder {
    pub fn new(id: &str, path: impl AsRef<Path>) -> Self {
        Self {
            id: id.to_string(),
            path: path.as_ref().to_path_buf(),
            rules: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), RuleScope::Both));
        self
    }

    pub fn exclude_rule(mut self, pattern: &str, scope: RuleScope) -> Self {
        self.rules.push((pattern.to_string(), scope));
        self
    }

    pub fn target(mut self, id: &str, path: impl AsRef<Path>) -> Self {
        self.targets.push((id.to_string(), path.as_ref().to_path_buf()));
        self
    }

    pub fn build(self) -> WatchRoot {
        let rules = self
            .rules
            .iter()
            .map(|(p, scope)| ExclusionRule::new(p, *scope).expect("valid exclusion pattern"))
            .collect();
        let targets = self
            .targets
            .into_iter()
            .map(|(id, path)| SyncTarget {
                id,
                root_id: self.id.clone(),
                path,
            })
            .collect();
        WatchRoot {
            id: self.id,
            path: self.path,
            matcher: ExclusionMatcher::new(rules),
            targets,
        }
    }
}

/// Builder for [`SyncConfig`] with test-friendly defaults: short windows,
/// no retry delays, fast restarts.
pub struct ConfigBuilder {
    options: EngineOptions,
    roots: Vec<WatchRoot>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut options = EngineOptions::default();
        options.debounce = Duration::from_millis(50);
        options.rename_window = Duration::from_millis(20);
        options.retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        options.restart_backoff = Duration::from_millis(20);
        options.restart_backoff_max = Duration::from_millis(100);
        options.shutdown_grace = Duration::from_secs(2);
        Self {
            options,
            roots: Vec::new(),
        }
    }

    pub fn root(mut self, root: RootBuilder) -> Self {
        self.roots.push(root.build());
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.options.debounce = Duration::from_millis(ms);
        self
    }

    pub fn rename_window_ms(mut self, ms: u64) -> Self {
        self.options.rename_window = Duration::from_millis(ms);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.options.workers = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.options.queue_capacity = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.options.retry = policy;
        self
    }

    pub fn checksum(mut self, on: bool) -> Self {
        self.options.checksum = on;
        self
    }

    pub fn reconcile_every(mut self, every: Duration) -> Self {
        self.options.reconcile_interval = Some(every);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.options.shutdown_grace = grace;
        self
    }

    pub fn build(self) -> SyncConfig {
        SyncConfig {
            options: self.options,
            roots: self.roots,
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
