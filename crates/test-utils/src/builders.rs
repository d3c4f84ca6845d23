#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use fleetvisor::config::{AgentSection, BackoffSettings, ConfigFile, ModuleConfig, RawConfigFile};
use fleetvisor::types::BackoffKind;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                agent: AgentSection::default(),
                module: BTreeMap::new(),
            },
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.agent.root = root.into();
        self
    }

    pub fn with_instance_id(mut self, id: &str) -> Self {
        self.config.agent.instance_id = Some(id.to_string());
        self
    }

    pub fn with_identity(mut self, providers: &[&str]) -> Self {
        self.config.agent.identity = providers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_history_keep(mut self, keep: usize) -> Self {
        self.config.agent.history_keep = keep;
        self
    }

    pub fn with_module(mut self, name: &str, module: ModuleConfig) -> Self {
        self.config.module.insert(name.to_string(), module);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ModuleConfig`.
pub struct ModuleConfigBuilder {
    module: ModuleConfig,
}

impl ModuleConfigBuilder {
    pub fn new(binary: &str, fragments: impl Into<PathBuf>) -> Self {
        Self {
            module: ModuleConfig {
                binary: binary.to_string(),
                args: String::new(),
                fragments: fragments.into(),
                include: vec!["*.yaml".to_string(), "*.yml".to_string()],
                secret_env: None,
                placeholder: "$API_KEY".to_string(),
                output_file: "config.yaml".to_string(),
                backoff: BackoffSettings::default(),
            },
        }
    }

    pub fn args(mut self, args: &str) -> Self {
        self.module.args = args.to_string();
        self
    }

    pub fn include(mut self, patterns: &[&str]) -> Self {
        self.module.include = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn secret_env(mut self, var: &str) -> Self {
        self.module.secret_env = Some(var.to_string());
        self
    }

    pub fn output_file(mut self, file: &str) -> Self {
        self.module.output_file = file.to_string();
        self
    }

    pub fn backoff(mut self, kind: BackoffKind, delay: &str, max_delay: &str) -> Self {
        self.module.backoff.kind = kind;
        self.module.backoff.delay = delay.to_string();
        self.module.backoff.max_delay = max_delay.to_string();
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.module.backoff.max_attempts = attempts;
        self
    }

    pub fn build(self) -> ModuleConfig {
        self.module
    }
}
