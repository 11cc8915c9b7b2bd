// src/watch/path_utils.rs

//! Path resolution between absolute source paths, root-relative paths and
//! destination paths.

use std::path::{Component, Path, PathBuf};

use crate::errors::PathError;
use crate::fs::FileSystem;
use crate::types::{RelPath, SyncTarget};

/// Resolve `.` and `..` lexically. `..` never climbs above the path's root.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn rel_to_string(rel: &Path) -> RelPath {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Convert `path` into a `/`-separated path relative to `root`.
///
/// Tries a lexical strip first and falls back to canonicalizing both sides,
/// which matters on platforms where the notifier reports a different
/// absolute prefix for the same directory (e.g. `/private/var` on macOS).
pub fn to_relative(path: &Path, root: &Path) -> Result<RelPath, PathError> {
    let norm_path = normalize_lexical(path);
    let norm_root = normalize_lexical(root);

    if let Ok(rel) = norm_path.strip_prefix(&norm_root) {
        return Ok(rel_to_string(rel));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Ok(rel_to_string(rel));
        }
    }

    Err(PathError::NotUnderRoot {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    })
}

/// Join `rel_path` onto the target's root.
///
/// Fails with `PathEscape` unless the result is a strict descendant of the
/// target root; absolute and `..`-crafted inputs are rejected this way.
pub fn to_destination(rel_path: &str, target: &SyncTarget) -> Result<PathBuf, PathError> {
    let escape = || PathError::PathEscape {
        path: target.path.join(rel_path),
        root: target.path.clone(),
    };

    let rel = Path::new(rel_path);
    if rel.has_root() || rel_path.starts_with('/') {
        return Err(escape());
    }

    let root = normalize_lexical(&target.path);
    let mut dest = root.clone();
    for segment in rel_path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if dest == root {
                    return Err(escape());
                }
                dest.pop();
            }
            name => dest.push(name),
        }
    }

    if dest == root || !dest.starts_with(&root) {
        return Err(escape());
    }
    Ok(dest)
}

/// Reject `dest` when its nearest existing ancestor resolves (through a
/// symlink) outside the target root. A target root that does not exist yet
/// cannot be escaped.
pub fn check_symlink_escape(
    fs: &dyn FileSystem,
    dest: &Path,
    target_root: &Path,
) -> Result<(), PathError> {
    let Ok(root_canon) = fs.canonicalize(target_root) else {
        return Ok(());
    };

    let mut ancestor = dest.parent();
    while let Some(dir) = ancestor {
        if !dir.starts_with(target_root) {
            break;
        }
        if fs.exists(dir) {
            return match fs.canonicalize(dir) {
                Ok(canon) if canon.starts_with(&root_canon) => Ok(()),
                _ => Err(PathError::PathEscape {
                    path: dest.to_path_buf(),
                    root: target_root.to_path_buf(),
                }),
            };
        }
        ancestor = dir.parent();
    }
    Ok(())
}
