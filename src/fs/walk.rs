// src/fs/walk.rs

//! Depth-first traversal over a [`FileSystem`] with caller-controlled pruning.

use std::path::{Path, PathBuf};

use super::{FileMeta, FileSystem, join_rel};
use crate::types::RelPath;

/// One visited entry. `rel` is relative to the walk base.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub rel: RelPath,
    pub abs: PathBuf,
    pub meta: FileMeta,
}

/// Visitor verdict for a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descend {
    Yes,
    No,
}

/// A directory that could not be listed or an entry that could not be stat'ed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkError {
    pub path: PathBuf,
    pub message: String,
}

/// What a walk could not cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Listings or stats that failed. Anything below them went unseen.
    pub errors: Vec<WalkError>,
    /// Entries whose name cannot be expressed as a relative path. They are
    /// neither visited nor descended into.
    pub unrepresentable: Vec<PathBuf>,
}

impl WalkReport {
    /// True when every listable entry was either visited or pruned.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Walk everything below `base/start_rel`, parents before children, siblings
/// in name order. The start entry itself is not visited.
///
/// Symlinks are reported to the visitor but never followed. Errors are
/// collected and the walk continues with the next sibling.
pub fn walk_tree<F>(fs: &dyn FileSystem, base: &Path, start_rel: &str, mut visit: F) -> WalkReport
where
    F: FnMut(&WalkEntry) -> Descend,
{
    let mut report = WalkReport::default();
    let mut stack: Vec<RelPath> = vec![start_rel.to_string()];

    while let Some(dir_rel) = stack.pop() {
        let dir_abs = join_rel(base, &dir_rel);
        let mut children = match fs.read_dir(&dir_abs) {
            Ok(children) => children,
            Err(err) => {
                report.errors.push(WalkError {
                    path: dir_abs,
                    message: format!("{:#}", err),
                });
                continue;
            }
        };
        children.sort();

        let mut subdirs = Vec::new();
        for abs in children {
            let Some(name) = abs.file_name().and_then(|n| n.to_str()) else {
                report.unrepresentable.push(abs);
                continue;
            };
            let rel = if dir_rel.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", dir_rel, name)
            };

            let meta = match fs.metadata(&abs) {
                Ok(Some(meta)) => meta,
                // Vanished between listing and stat.
                Ok(None) => continue,
                Err(err) => {
                    report.errors.push(WalkError {
                        path: abs,
                        message: format!("{:#}", err),
                    });
                    continue;
                }
            };

            let entry = WalkEntry { rel, abs, meta };
            let descend = visit(&entry);
            if entry.meta.is_dir() && descend == Descend::Yes {
                subdirs.push(entry.rel);
            }
        }

        // Reverse so the stack pops them in name order.
        stack.extend(subdirs.into_iter().rev());
    }

    report
}
