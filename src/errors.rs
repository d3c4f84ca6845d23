// src/errors.rs

//! Crate-wide error type and `Result` alias.

use std::path::PathBuf;

use thiserror::Error;

use crate::merge::MergeError;

#[derive(Error, Debug)]
pub enum FleetvisorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The merge strategy refused the pushed fragments.
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// Materializing an output file failed; the location is left as-is.
    #[error("Write error at {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The child binary could not be started at all.
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backoff policy gave up restarting '{program}' after {restarts} restart(s)")]
    BackoffExhausted { program: String, restarts: u32 },

    #[error("Syntax error in command line {line:?}: unsupported character {found:?}")]
    Syntax { line: String, found: char },

    #[error("Supervision cancelled")]
    Cancelled,

    #[error("History tracker rejected {location:?}: {message}")]
    History { location: PathBuf, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FleetvisorError {
    /// True for the error a supervisor returns when it was asked to stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FleetvisorError::Cancelled)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FleetvisorError>;
