// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodesyncError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid exclusion pattern '{pattern}': {source}")]
    PatternError {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Input-validation failures raised by the path resolver.
///
/// These only ever abort the single event or entry being processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path {path:?} is not under watch root {root:?}")]
    NotUnderRoot { path: PathBuf, root: PathBuf },

    #[error("destination {path:?} escapes target root {root:?}")]
    PathEscape { path: PathBuf, root: PathBuf },
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CodesyncError>;
