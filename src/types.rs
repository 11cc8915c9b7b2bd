// src/types.rs

//! Data model shared by the watch pipeline, the executor and the supervisor.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::Deserialize;
use tokio::time::Instant;

use crate::watch::patterns::ExclusionMatcher;

pub type RootId = String;
pub type TargetId = String;

/// Path relative to a watch root, always `/`-separated.
///
/// The empty string denotes the root itself.
pub type RelPath = String;

/// Which kind of entry an exclusion rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Files,
    Dirs,
    Both,
}

impl Default for RuleScope {
    fn default() -> Self {
        RuleScope::Both
    }
}

/// A source tree under observation, with its exclusion rules and the
/// destinations it fans out to. Immutable once built from config.
#[derive(Debug, Clone)]
pub struct WatchRoot {
    pub id: RootId,
    pub path: PathBuf,
    pub matcher: ExclusionMatcher,
    pub targets: Vec<SyncTarget>,
}

impl WatchRoot {
    pub fn target(&self, id: &str) -> Option<&SyncTarget> {
        self.targets.iter().find(|t| t.id == id)
    }
}

/// A destination tree mirroring one [`WatchRoot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub id: TargetId,
    pub root_id: RootId,
    pub path: PathBuf,
}

/// Heuristic identity of a file, used to pair a removal with a creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub inode: Option<u64>,
    pub is_dir: bool,
}

impl FileIdentity {
    /// Inode equality when both sides have one, size+mtime otherwise.
    pub fn same_file(&self, other: &FileIdentity) -> bool {
        if self.is_dir != other.is_dir {
            return false;
        }
        match (self.inode, other.inode) {
            (Some(a), Some(b)) => a == b,
            _ => self.len == other.len && self.modified.is_some() && self.modified == other.modified,
        }
    }
}

/// Raw notification kinds as delivered by a watch source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawKind {
    Created,
    Modified,
    Removed,
    /// First half of a rename whose other half may or may not follow.
    RenamedFrom,
    /// Second half of a rename.
    RenamedTo,
    /// A rename the OS already paired; `path` is the new location.
    Renamed { from: PathBuf },
}

/// One raw notification, before it is stamped with its root and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: RawKind,
    pub identity: Option<FileIdentity>,
}

impl RawChange {
    pub fn new(path: impl Into<PathBuf>, kind: RawKind) -> Self {
        Self {
            path: path.into(),
            kind,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: FileIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// A raw notification attributed to a watch root.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub root_id: RootId,
    pub path: PathBuf,
    pub kind: RawKind,
    pub identity: Option<FileIdentity>,
    pub observed_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalKind {
    Created,
    Modified,
    Deleted,
    Renamed { from: PathBuf },
}

/// Output of the event normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub path: PathBuf,
    pub kind: CanonicalKind,
    pub is_dir: Option<bool>,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Create,
    Modify,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Create => "create",
            ActionKind::Modify => "modify",
            ActionKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// The single merged operation the aggregator decided on for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveAction {
    pub root_id: RootId,
    pub rel_path: RelPath,
    pub kind: ActionKind,
    pub window_close_at: Instant,
}

/// Per-path serialization key used by the work queue.
pub type ActionKey = (RootId, RelPath);

impl EffectiveAction {
    pub fn key(&self) -> ActionKey {
        (self.root_id.clone(), self.rel_path.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Excluded,
    Symlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedOp {
    /// A file was written to the destination.
    Copied,
    /// A directory was mirrored; `files` counts the files actually written.
    CopiedTree { files: usize },
    /// Destination already matched the source.
    Unchanged,
    Removed,
    AlreadyAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient I/O error that outlived every retry.
    TransientIo,
    PermanentIo,
    PathEscape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied(AppliedOp),
    Skipped(SkipReason),
    Failed(Failure),
}

/// Terminal result of one action against one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub root_id: RootId,
    pub target_id: TargetId,
    pub rel_path: RelPath,
    pub outcome: SyncOutcome,
    pub attempts: u32,
}

impl SyncResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Failed(_))
    }
}
