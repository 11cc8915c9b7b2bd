// src/exec/executor.rs

//! Applies effective actions to every destination of a root.
//!
//! All work here is synchronous filesystem I/O; workers call into it from
//! `spawn_blocking`. Each (action, target) pair yields exactly one
//! [`SyncResult`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use crate::exec::retry::{ErrorClass, RetryPolicy, classify};
use crate::fs::walk::{Descend, walk_tree};
use crate::fs::{EntryKind, FileMeta, FileSystem, is_not_found, join_rel};
use crate::types::{
    ActionKind, AppliedOp, EffectiveAction, Failure, FailureKind, RootId, SkipReason, SyncOutcome,
    SyncResult, SyncTarget, WatchRoot,
};
use crate::watch::hash::same_contents;
use crate::watch::path_utils::{check_symlink_escape, to_destination};

/// Name of the temporary sibling used for atomic writes.
pub fn temp_sibling(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.codesync.tmp", name))
}

#[derive(Debug, Clone)]
pub struct SyncExecutor {
    fs: Arc<dyn FileSystem>,
    roots: HashMap<RootId, Arc<WatchRoot>>,
    retry: RetryPolicy,
    checksum: bool,
}

impl SyncExecutor {
    pub fn new<I>(fs: Arc<dyn FileSystem>, roots: I, retry: RetryPolicy, checksum: bool) -> Self
    where
        I: IntoIterator<Item = Arc<WatchRoot>>,
    {
        Self {
            fs,
            roots: roots.into_iter().map(|r| (r.id.clone(), r)).collect(),
            retry,
            checksum,
        }
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn root(&self, id: &str) -> Option<&Arc<WatchRoot>> {
        self.roots.get(id)
    }

    pub fn apply(&self, action: &EffectiveAction) -> Vec<SyncResult> {
        self.apply_kind(&action.root_id, &action.rel_path, action.kind)
    }

    /// One result per target of `root_id`.
    pub fn apply_kind(&self, root_id: &str, rel_path: &str, kind: ActionKind) -> Vec<SyncResult> {
        let Some(root) = self.roots.get(root_id) else {
            warn!(root = %root_id, path = %rel_path, "action for unknown root dropped");
            return Vec::new();
        };
        root.targets
            .iter()
            .map(|target| self.apply_to_target(root, target, rel_path, kind))
            .collect()
    }

    pub fn apply_to_target(
        &self,
        root: &WatchRoot,
        target: &SyncTarget,
        rel_path: &str,
        kind: ActionKind,
    ) -> SyncResult {
        let result = |outcome, attempts| SyncResult {
            root_id: root.id.clone(),
            target_id: target.id.clone(),
            rel_path: rel_path.to_string(),
            outcome,
            attempts,
        };

        let src = join_rel(&root.path, rel_path);
        let dest = to_destination(rel_path, target);

        if self.is_excluded(root, rel_path, &src, dest.as_ref().ok()) {
            debug!(root = %root.id, target = %target.id, path = %rel_path, "excluded");
            return result(SyncOutcome::Skipped(SkipReason::Excluded), 0);
        }

        let dest = match dest.and_then(|d| {
            check_symlink_escape(self.fs.as_ref(), &d, &target.path).map(|_| d)
        }) {
            Ok(dest) => dest,
            Err(err) => {
                warn!(root = %root.id, target = %target.id, path = %rel_path, error = %err, "rejected");
                return result(
                    SyncOutcome::Failed(Failure {
                        kind: FailureKind::PathEscape,
                        message: err.to_string(),
                    }),
                    0,
                );
            }
        };

        // Every kind converges on what the source holds right now; the
        // action kind only says why we looked.
        let (res, attempts) = self.retry.run(|| match kind {
            ActionKind::Delete if self.fs.metadata(&src)?.is_none() => {
                self.remove_entry(&dest).map(SyncOutcome::Applied)
            }
            ActionKind::Delete => {
                debug!(root = %root.id, path = %rel_path, "source exists again, copying instead of removing");
                self.copy_entry(root, rel_path, &src, &dest, &target.path)
            }
            ActionKind::Create | ActionKind::Modify => {
                self.copy_entry(root, rel_path, &src, &dest, &target.path)
            }
        });

        let outcome = match res {
            Ok(outcome) => outcome,
            Err(err) => {
                let kind = match classify(&err) {
                    ErrorClass::Transient => FailureKind::TransientIo,
                    ErrorClass::Permanent => FailureKind::PermanentIo,
                };
                SyncOutcome::Failed(Failure {
                    kind,
                    message: format!("{:#}", err),
                })
            }
        };
        result(outcome, attempts)
    }

    /// Decide exclusion with the best kind information available: the source
    /// entry, else whatever sits at the destination, else either kind.
    fn is_excluded(&self, root: &WatchRoot, rel_path: &str, src: &Path, dest: Option<&PathBuf>) -> bool {
        let src_kind = self.fs.metadata(src).ok().flatten();
        let dest_kind = || dest.and_then(|d| self.fs.metadata(d).ok().flatten());
        match src_kind.or_else(dest_kind) {
            Some(meta) => root.matcher.excluded(rel_path, meta.is_dir()),
            None => root.matcher.excluded_any(rel_path),
        }
    }

    fn copy_entry(
        &self,
        root: &WatchRoot,
        rel_path: &str,
        src: &Path,
        dest: &Path,
        target_root: &Path,
    ) -> Result<SyncOutcome> {
        let Some(meta) = self.fs.metadata(src)? else {
            // Gone again before we got here: the latest truth is "absent".
            debug!(path = %rel_path, "source vanished, removing destination");
            return self.remove_entry(dest).map(SyncOutcome::Applied);
        };

        match meta.kind {
            EntryKind::Symlink => Ok(SyncOutcome::Skipped(SkipReason::Symlink)),
            EntryKind::Dir => self
                .copy_tree(root, rel_path, dest, target_root)
                .map(|files| SyncOutcome::Applied(AppliedOp::CopiedTree { files })),
            EntryKind::File => self
                .copy_file(src, dest, &meta, target_root)
                .map(SyncOutcome::Applied),
        }
    }

    /// Mirror the non-excluded subtree at `rel_path`. Returns the number of
    /// files written.
    fn copy_tree(&self, root: &WatchRoot, rel_path: &str, dest: &Path, target_root: &Path) -> Result<usize> {
        self.ensure_dir(dest, target_root)?;

        let prefix_len = if rel_path.is_empty() { 0 } else { rel_path.len() + 1 };
        let mut written = 0;
        let mut first_err: Option<anyhow::Error> = None;

        let report = walk_tree(self.fs.as_ref(), &root.path, rel_path, |entry| {
            if first_err.is_some() {
                return Descend::No;
            }
            let is_dir = entry.meta.is_dir();
            if root.matcher.excluded(&entry.rel, is_dir) {
                return Descend::No;
            }
            let entry_dest = join_rel(dest, &entry.rel[prefix_len.min(entry.rel.len())..]);
            let res = match entry.meta.kind {
                EntryKind::Dir => self.ensure_dir(&entry_dest, target_root),
                EntryKind::File => self
                    .copy_file(&entry.abs, &entry_dest, &entry.meta, target_root)
                    .map(|op| {
                        if op == AppliedOp::Copied {
                            written += 1;
                        }
                    }),
                EntryKind::Symlink => Ok(()),
            };
            match res {
                Ok(()) => Descend::Yes,
                Err(err) => {
                    first_err = Some(err);
                    Descend::No
                }
            }
        });

        if let Some(err) = first_err {
            return Err(err);
        }
        for path in &report.unrepresentable {
            warn!(path = ?path, "name is not valid UTF-8, not mirrored");
        }
        if let Some(walk_err) = report.errors.into_iter().next() {
            return Err(anyhow!("walking {:?}: {}", walk_err.path, walk_err.message));
        }
        Ok(written)
    }

    /// Copy one regular file, leaving an up-to-date destination untouched.
    pub(crate) fn copy_file(
        &self,
        src: &Path,
        dest: &Path,
        src_meta: &FileMeta,
        target_root: &Path,
    ) -> Result<AppliedOp> {
        match self.fs.metadata(dest)? {
            Some(existing) if existing.is_dir() => self.fs.remove_dir_all(dest)?,
            Some(existing) if existing.kind == EntryKind::Symlink => self.fs.remove_file(dest)?,
            Some(existing) => {
                if self.is_up_to_date(src, src_meta, dest, &existing)? {
                    return Ok(AppliedOp::Unchanged);
                }
            }
            None => {}
        }

        let data = match self.fs.read(src) {
            Ok(data) => data,
            Err(err) if is_not_found(&err) => return self.remove_entry(dest),
            Err(err) => return Err(err),
        };

        self.ensure_parent_dirs(dest, target_root)?;
        self.atomic_write(dest, &data, src_meta)?;
        debug!(dest = ?dest, bytes = data.len(), "copied");
        Ok(AppliedOp::Copied)
    }

    pub(crate) fn is_up_to_date(
        &self,
        src: &Path,
        src_meta: &FileMeta,
        dest: &Path,
        dest_meta: &FileMeta,
    ) -> Result<bool> {
        if !dest_meta.is_file()
            || dest_meta.len != src_meta.len
            || src_meta.modified.is_none()
            || dest_meta.modified != src_meta.modified
        {
            return Ok(false);
        }
        if let (Some(a), Some(b)) = (src_meta.mode, dest_meta.mode) {
            if a != b {
                return Ok(false);
            }
        }
        if self.checksum {
            return same_contents(self.fs.as_ref(), src, dest);
        }
        Ok(true)
    }

    /// Remove whatever sits at `dest`. Absent is success.
    pub(crate) fn remove_entry(&self, dest: &Path) -> Result<AppliedOp> {
        let res = match self.fs.metadata(dest)? {
            None => return Ok(AppliedOp::AlreadyAbsent),
            Some(meta) if meta.is_dir() => self.fs.remove_dir_all(dest),
            Some(_) => self.fs.remove_file(dest),
        };
        match res {
            Ok(()) => {
                debug!(dest = ?dest, "removed");
                Ok(AppliedOp::Removed)
            }
            Err(err) if is_not_found(&err) => Ok(AppliedOp::AlreadyAbsent),
            Err(err) => Err(err),
        }
    }

    /// Write to a temporary sibling, stamp metadata, then rename into place,
    /// so readers never see a partial file.
    fn atomic_write(&self, dest: &Path, data: &[u8], meta: &FileMeta) -> Result<()> {
        let tmp = temp_sibling(dest);
        let res = self
            .fs
            .write(&tmp, data)
            .and_then(|_| self.fs.set_metadata(&tmp, meta))
            .and_then(|_| self.fs.rename(&tmp, dest));
        if res.is_err() && self.fs.exists(&tmp) {
            let _ = self.fs.remove_file(&tmp);
        }
        res
    }

    fn ensure_dir(&self, dir: &Path, target_root: &Path) -> Result<()> {
        match self.fs.metadata(dir)? {
            Some(meta) if meta.is_dir() => return Ok(()),
            Some(_) => self.fs.remove_file(dir)?,
            None => {}
        }
        self.ensure_parent_dirs(dir, target_root)?;
        self.fs.create_dir_all(dir)
    }

    /// Create missing parents of `path`, replacing non-directories found on
    /// the way (the source turned a file into a directory).
    fn ensure_parent_dirs(&self, path: &Path, target_root: &Path) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        for ancestor in parent.ancestors() {
            if ancestor == target_root || !ancestor.starts_with(target_root) {
                break;
            }
            match self.fs.metadata(ancestor)? {
                Some(meta) if meta.is_dir() => break,
                Some(_) => {
                    self.fs.remove_file(ancestor)?;
                    break;
                }
                None => {}
            }
        }
        self.fs.create_dir_all(parent)
    }
}
