// src/types.rs

use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical module name type used throughout the agent.
pub type ModuleName = String;

/// Fragments as pushed by the management service: fragment name -> raw bytes.
///
/// The map has no intrinsic order; anything that needs determinism (merge
/// precedence, hashing) sorts the keys itself.
pub type RawConfigSet = HashMap<String, Vec<u8>>;

/// Output of a merge: path relative to the output location -> file content.
pub type OutputConfigSet = HashMap<String, Vec<u8>>;

/// Which backoff strategy a module uses between restarts of its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay before every restart.
    Fixed,
    /// Delay doubles on every restart, up to `max_delay`.
    Exponential,
}

impl Default for BackoffKind {
    fn default() -> Self {
        BackoffKind::Fixed
    }
}

impl FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            other => Err(format!(
                "invalid backoff kind: {other} (expected \"fixed\" or \"exponential\")"
            )),
        }
    }
}
