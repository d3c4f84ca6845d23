// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::config::duration::parse_duration;
use crate::exec::backoff::{BackoffPolicy, DEFAULT_DELAY, DEFAULT_MAX_DELAY};
use crate::merge::yaml::{DEFAULT_OUTPUT_FILE, DEFAULT_SECRET_PLACEHOLDER};
use crate::types::BackoffKind;

/// Agent configuration exactly as deserialized from TOML.
///
/// ```toml
/// [agent]
/// root = "/var/lib/fleetvisor"
/// identity = ["env:FLEETVISOR_INSTANCE_ID", "hostname", "machine-id"]
///
/// [module.collector]
/// binary = "/usr/bin/otelcol"
/// fragments = "conf.d/collector"
///
/// [module.collector.backoff]
/// kind = "exponential"
/// delay = "500ms"
/// ```
///
/// Nothing here has been checked yet; convert into [`ConfigFile`] with
/// `TryFrom` to validate.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub agent: AgentSection,

    /// All modules from `[module.<name>]`, keyed by module name.
    #[serde(default)]
    pub module: BTreeMap<String, ModuleConfig>,
}

/// Validated agent configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub agent: AgentSection,
    pub module: BTreeMap<String, ModuleConfig>,
}

impl ConfigFile {
    /// Build without validation. Only `TryFrom<RawConfigFile>` and tests
    /// should call this.
    pub fn new_unchecked(agent: AgentSection, module: BTreeMap<String, ModuleConfig>) -> Self {
        Self { agent, module }
    }
}

/// `[agent]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSection {
    /// Directory under which every module keeps its output locations.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Explicit instance id; tried before `identity`.
    #[serde(default)]
    pub instance_id: Option<String>,

    /// Identity providers, tried in order.
    #[serde(default = "default_identity")]
    pub identity: Vec<String>,

    /// Output locations kept per module; older ones are deleted. 0 keeps all.
    #[serde(default = "default_history_keep")]
    pub history_keep: usize,
}

fn default_root() -> PathBuf {
    PathBuf::from("/var/lib/fleetvisor")
}

fn default_identity() -> Vec<String> {
    vec![
        "env:FLEETVISOR_INSTANCE_ID".to_string(),
        "hostname".to_string(),
        "machine-id".to_string(),
    ]
}

fn default_history_keep() -> usize {
    5
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            instance_id: None,
            identity: default_identity(),
            history_keep: default_history_keep(),
        }
    }
}

/// `[module.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Binary started with `--config <location>/<output_file>`.
    pub binary: String,

    /// Extra arguments, as a single whitespace-separated line.
    #[serde(default)]
    pub args: String,

    /// Directory holding this module's fragments. Relative paths resolve
    /// against the directory of the agent config file.
    pub fragments: PathBuf,

    /// Globs selecting fragment files inside `fragments`.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Environment variable holding the secret substituted for `placeholder`.
    #[serde(default)]
    pub secret_env: Option<String>,

    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    #[serde(default = "default_output_file")]
    pub output_file: String,

    #[serde(default)]
    pub backoff: BackoffSettings,
}

fn default_include() -> Vec<String> {
    vec!["*.yaml".to_string(), "*.yml".to_string()]
}

fn default_placeholder() -> String {
    DEFAULT_SECRET_PLACEHOLDER.to_string()
}

fn default_output_file() -> String {
    DEFAULT_OUTPUT_FILE.to_string()
}

/// `[module.<name>.backoff]` section. Durations are kept as strings until
/// [`BackoffSettings::policy`] parses them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffSettings {
    #[serde(default)]
    pub kind: BackoffKind,

    #[serde(default = "default_delay")]
    pub delay: String,

    #[serde(default = "default_max_delay")]
    pub max_delay: String,

    /// 0 = retry forever.
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_delay() -> String {
    format!("{}ms", DEFAULT_DELAY.as_millis())
}

fn default_max_delay() -> String {
    format!("{}ms", DEFAULT_MAX_DELAY.as_millis())
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            kind: BackoffKind::default(),
            delay: default_delay(),
            max_delay: default_max_delay(),
            max_attempts: 0,
        }
    }
}

impl BackoffSettings {
    /// Parse the durations into a policy that can build backoff instances.
    pub fn policy(&self) -> Result<BackoffPolicy, String> {
        Ok(BackoffPolicy {
            kind: self.kind,
            delay: parse_duration(&self.delay)?,
            max_delay: parse_duration(&self.max_delay)?,
            max_attempts: self.max_attempts,
        })
    }
}
