// src/agent/mod.rs

//! Per-module orchestration.
//!
//! Every configured module gets one [`AgentModule`] driven by its own event
//! queue. Producers (the local fragment watcher, or a management-protocol
//! client) send [`ModuleEvent`]s; the module reports progress through a
//! [`ModuleStatus`] watch channel.
//!
//! The event loop itself lives in [`module`].

use std::path::PathBuf;

use crate::types::{ModuleName, RawConfigSet};

pub mod module;

pub use module::AgentModule;

/// Events consumed by a module's event loop.
#[derive(Debug, Clone)]
pub enum ModuleEvent {
    /// A complete new set of fragments for this module.
    ConfigPushed { fragments: RawConfigSet },
    /// Stop the current supervisor and exit the loop.
    Shutdown,
}

/// What a module is doing right now, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    /// No configuration applied yet.
    Idle,
    /// A changed configuration is being swapped in.
    Applying,
    Running { generation: u64, location: PathBuf },
    Failed(String),
    Stopped,
}

/// Static per-module launch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSettings {
    pub name: ModuleName,
    /// Binary started for every generation.
    pub binary: String,
    /// Extra arguments appended after `--config <file>`, as one command line.
    pub args: String,
    /// File inside each output location the child is pointed at.
    pub output_file: String,
}

impl ModuleSettings {
    pub fn new(name: impl Into<ModuleName>, binary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            args: String::new(),
            output_file: crate::merge::yaml::DEFAULT_OUTPUT_FILE.to_string(),
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn with_output_file(mut self, output_file: impl Into<String>) -> Self {
        self.output_file = output_file.into();
        self
    }
}
