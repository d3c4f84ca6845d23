// src/merge/mod.rs

//! Merge strategies: turn pushed fragments into the files a module's child
//! process reads.
//!
//! A strategy must refuse any fragment it does not understand with an error
//! naming that fragment. It never drops or guesses.

use serde::Serialize;
use thiserror::Error;

use crate::types::{OutputConfigSet, RawConfigSet};

pub mod yaml;

pub use yaml::YamlMergeStrategy;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("unsupported fragment '{name}': {reason}")]
    UnsupportedFragment { name: String, reason: String },

    #[error("malformed fragment '{name}': {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("fragment '{name}' must be a mapping at the top level")]
    NotAMapping { name: String },

    #[error("fragment '{name}' uses a name reserved for the agent")]
    ReservedName { name: String },

    #[error("serializing merged configuration: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

/// Who is running: attached to the merged configuration so downstream
/// tooling can attribute telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleIdentity {
    pub instance_id: String,
    pub module: String,
}

/// Domain-specific transform from raw fragments to output files.
pub trait MergeStrategy: Send + Sync {
    fn merge(&self, raw: &RawConfigSet) -> Result<OutputConfigSet, MergeError>;

    /// Extra fragments describing `identity`, added to every push before
    /// merging. Strategies with nowhere to put them return nothing.
    fn identity_fragments(&self, _identity: &ModuleIdentity) -> Result<RawConfigSet, MergeError> {
        Ok(RawConfigSet::new())
    }
}
