// src/config/mod.rs

//! Agent configuration: TOML model, loading and validation.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path};
pub use model::{AgentSection, BackoffSettings, ConfigFile, ModuleConfig, RawConfigFile};
