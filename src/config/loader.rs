// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ExcludeSpec, RawConfigFile, SyncConfig, TargetSpec};
use crate::errors::{CodesyncError, Result};
use crate::watch::patterns::parse_exclude_lines;

/// Load a configuration file and return the raw `RawConfigFile`.
///
/// Relative paths (roots, targets, exclude files) are resolved against the
/// directory holding the config file, and every `exclude_file` is read and
/// appended to its root's inline patterns. No semantic validation happens
/// here; use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|err| {
        CodesyncError::ConfigError(format!("cannot read config {:?}: {}", path, err))
    })?;

    let mut config: RawConfigFile = toml::from_str(&contents)?;

    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let base_dir = base_dir.canonicalize().unwrap_or(base_dir);

    resolve_relative_paths(&mut config, &base_dir);
    expand_exclude_files(&mut config)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// This is the recommended entry point for the rest of the application.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SyncConfig> {
    let raw_config = load_from_path(&path)?;
    SyncConfig::try_from(raw_config)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Make every path in the config absolute, relative to `base`.
pub fn resolve_relative_paths(config: &mut RawConfigFile, base: &Path) {
    for root in &mut config.root {
        root.path = resolve(base, &root.path);
        if let Some(file) = &root.exclude_file {
            root.exclude_file = Some(resolve(base, file));
        }
        for target in &mut root.targets {
            match target {
                TargetSpec::Path(p) => *p = resolve(base, p),
                TargetSpec::Named { path, .. } => *path = resolve(base, path),
            }
        }
    }
}

/// Read each root's `exclude_file` and append its patterns after the inline
/// ones.
pub fn expand_exclude_files(config: &mut RawConfigFile) -> Result<()> {
    for root in &mut config.root {
        let Some(file) = root.exclude_file.take() else {
            continue;
        };
        let text = fs::read_to_string(&file).map_err(|err| {
            CodesyncError::ConfigError(format!("cannot read exclude file {:?}: {}", file, err))
        })?;
        root.exclude
            .extend(parse_exclude_lines(&text).into_iter().map(ExcludeSpec::Pattern));
    }
    Ok(())
}
