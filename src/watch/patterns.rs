// src/watch/patterns.rs

//! Exclusion rules and the compiled matcher consulted by every stage.
//!
//! Pattern syntax, relative to the watch root:
//!
//! ```text
//! *.tmp        any entry named `*.tmp`, at any depth
//! .git/        any directory named `.git` (and everything below it)
//! /build       only `build` directly under the root
//! docs/*.bak   anchored, because it contains an inner `/`
//! ```

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};

use crate::errors::{CodesyncError, Result};
use crate::types::RuleScope;

/// One compiled exclusion rule.
#[derive(Clone)]
pub struct ExclusionRule {
    pattern: String,
    scope: RuleScope,
    matcher: GlobMatcher,
}

impl fmt::Debug for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusionRule")
            .field("pattern", &self.pattern)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ExclusionRule {
    /// Compile `pattern`. A trailing `/` restricts the rule to directories
    /// regardless of `scope`.
    pub fn new(pattern: &str, scope: RuleScope) -> Result<Self> {
        let trimmed = pattern.trim();
        let (body, scope) = match trimmed.strip_suffix('/') {
            Some(body) => (body, RuleScope::Dirs),
            None => (trimmed, scope),
        };

        let anchored = body.starts_with('/') || body.contains('/');
        let body = body.trim_start_matches('/');
        if body.is_empty() {
            return Err(CodesyncError::ConfigError(format!(
                "empty exclusion pattern {:?}",
                pattern
            )));
        }

        let glob = if anchored {
            body.to_string()
        } else {
            format!("**/{}", body)
        };

        let matcher = GlobBuilder::new(&glob)
            .literal_separator(true)
            .build()
            .map_err(|source| CodesyncError::PatternError {
                pattern: pattern.to_string(),
                source,
            })?
            .compile_matcher();

        Ok(Self {
            pattern: pattern.to_string(),
            scope,
            matcher,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn scope(&self) -> RuleScope {
        self.scope
    }

    fn applies(&self, rel_path: &str, is_dir: bool) -> bool {
        let scope_ok = match self.scope {
            RuleScope::Both => true,
            RuleScope::Dirs => is_dir,
            RuleScope::Files => !is_dir,
        };
        scope_ok && self.matcher.is_match(rel_path)
    }
}

/// Ordered deny list. Pure: no filesystem access.
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    rules: Vec<ExclusionRule>,
}

impl ExclusionMatcher {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        Self { rules }
    }

    /// Compile plain patterns, all with [`RuleScope::Both`].
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|p| ExclusionRule::new(p.as_ref(), RuleScope::Both))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    /// First rule excluding `rel_path`, checking each ancestor directory
    /// before the entry itself.
    pub fn first_match(&self, rel_path: &str, is_dir: bool) -> Option<&ExclusionRule> {
        if rel_path.is_empty() {
            return None;
        }

        for (idx, _) in rel_path.match_indices('/') {
            let ancestor = &rel_path[..idx];
            if ancestor.is_empty() {
                continue;
            }
            if let Some(rule) = self.rules.iter().find(|r| r.applies(ancestor, true)) {
                return Some(rule);
            }
        }

        self.rules.iter().find(|r| r.applies(rel_path, is_dir))
    }

    pub fn excluded(&self, rel_path: &str, is_dir: bool) -> bool {
        self.first_match(rel_path, is_dir).is_some()
    }

    /// For entries whose kind is unknown, e.g. something already deleted.
    pub fn excluded_any(&self, rel_path: &str) -> bool {
        self.excluded(rel_path, false) || self.excluded(rel_path, true)
    }
}

/// Parse an exclude file: one pattern per line, blank lines and `#`
/// comments ignored.
pub fn parse_exclude_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
