// src/config/validate.rs

use std::collections::HashSet;
use std::path::Path;

use crate::config::model::{EngineOptions, RawConfigFile, RootSection, SyncConfig, TargetSpec};
use crate::errors::{CodesyncError, Result};
use crate::types::{SyncTarget, WatchRoot};
use crate::watch::path_utils::normalize_lexical;
use crate::watch::patterns::{ExclusionMatcher, ExclusionRule};

impl TryFrom<RawConfigFile> for SyncConfig {
    type Error = CodesyncError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let roots = raw
            .root
            .iter()
            .enumerate()
            .map(|(idx, section)| build_root(idx, section))
            .collect::<Result<Vec<_>>>()?;

        Ok(SyncConfig {
            options: EngineOptions::from(&raw.config),
            roots,
        })
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_roots(cfg)?;
    validate_engine_section(cfg)?;
    validate_roots(cfg)?;
    Ok(())
}

fn config_err(msg: String) -> CodesyncError {
    CodesyncError::ConfigError(msg)
}

fn ensure_has_roots(cfg: &RawConfigFile) -> Result<()> {
    if cfg.root.is_empty() {
        return Err(config_err(
            "config must contain at least one [[root]] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_section(cfg: &RawConfigFile) -> Result<()> {
    let c = &cfg.config;
    let at_least_one = [
        ("workers", c.workers as u64),
        ("queue_capacity", c.queue_capacity as u64),
        ("debounce_ms", c.debounce_ms),
        ("max_attempts", u64::from(c.max_attempts)),
    ];
    for (name, value) in at_least_one {
        if value == 0 {
            return Err(config_err(format!("[config].{} must be >= 1 (got 0)", name)));
        }
    }
    Ok(())
}

fn root_id(idx: usize, section: &RootSection) -> String {
    section
        .id
        .clone()
        .unwrap_or_else(|| format!("root{}", idx + 1))
}

fn target_id(idx: usize, spec: &TargetSpec) -> String {
    match spec {
        TargetSpec::Named { id, .. } => id.clone(),
        TargetSpec::Path(_) => format!("target{}", idx + 1),
    }
}

fn validate_roots(cfg: &RawConfigFile) -> Result<()> {
    let mut root_ids = HashSet::new();

    for (idx, section) in cfg.root.iter().enumerate() {
        let id = root_id(idx, section);
        if id.trim().is_empty() {
            return Err(config_err(format!("[[root]] #{} has an empty id", idx + 1)));
        }
        if !root_ids.insert(id.clone()) {
            return Err(config_err(format!("duplicate root id '{}'", id)));
        }
        if !section.path.is_absolute() {
            return Err(config_err(format!(
                "root '{}' path {:?} must be absolute",
                id, section.path
            )));
        }
        if section.targets.is_empty() {
            return Err(config_err(format!("root '{}' has no targets", id)));
        }

        let root_path = normalize_lexical(&section.path);
        let mut target_ids = HashSet::new();
        for (t_idx, spec) in section.targets.iter().enumerate() {
            let tid = target_id(t_idx, spec);
            if !target_ids.insert(tid.clone()) {
                return Err(config_err(format!(
                    "root '{}' has duplicate target id '{}'",
                    id, tid
                )));
            }
            let target_path = spec.path();
            if !target_path.is_absolute() {
                return Err(config_err(format!(
                    "root '{}' target '{}' path {:?} must be absolute",
                    id, tid, target_path
                )));
            }
            check_disjoint(&id, &tid, &root_path, &normalize_lexical(target_path))?;
        }
    }
    Ok(())
}

/// A target inside its root would be watched and copied into itself; a
/// root inside its target would be deleted as an orphan.
fn check_disjoint(root_id: &str, target_id: &str, root: &Path, target: &Path) -> Result<()> {
    if target.starts_with(root) || root.starts_with(target) {
        return Err(config_err(format!(
            "root '{}' and its target '{}' overlap ({:?} vs {:?})",
            root_id, target_id, root, target
        )));
    }
    Ok(())
}

fn build_root(idx: usize, section: &RootSection) -> Result<WatchRoot> {
    let id = root_id(idx, section);

    let rules = section
        .exclude
        .iter()
        .map(|spec| ExclusionRule::new(spec.pattern(), spec.scope()))
        .collect::<Result<Vec<_>>>()?;

    let targets = section
        .targets
        .iter()
        .enumerate()
        .map(|(t_idx, spec)| SyncTarget {
            id: target_id(t_idx, spec),
            root_id: id.clone(),
            path: normalize_lexical(spec.path()),
        })
        .collect();

    Ok(WatchRoot {
        id,
        path: normalize_lexical(&section.path),
        matcher: ExclusionMatcher::new(rules),
        targets,
    })
}
