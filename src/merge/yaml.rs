// src/merge/yaml.rs

//! Reference merge strategy: deep-merge YAML documents into one file.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::{MergeError, MergeStrategy, ModuleIdentity};
use crate::types::{OutputConfigSet, RawConfigSet};

/// Name of the merged output file.
pub const DEFAULT_OUTPUT_FILE: &str = "config.yaml";

/// Token replaced with the out-of-band secret after serialization.
pub const DEFAULT_SECRET_PLACEHOLDER: &str = "$API_KEY";

/// Fragment name used for the module's self-identification.
pub const IDENTITY_FRAGMENT: &str = "_fleetvisor_identity.yaml";

/// Top-level key the identity fragment is written under.
pub const IDENTITY_KEY: &str = "fleetvisor";

/// Deep-merges every fragment, in fragment-name order, into a single YAML
/// file. Nested mappings merge key by key; for anything else the fragment
/// that sorts later wins. The identity fragment is always merged last.
#[derive(Clone)]
pub struct YamlMergeStrategy {
    output_file: String,
    placeholder: String,
    secret: Option<String>,
}

impl std::fmt::Debug for YamlMergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YamlMergeStrategy")
            .field("output_file", &self.output_file)
            .field("placeholder", &self.placeholder)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for YamlMergeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl YamlMergeStrategy {
    pub fn new() -> Self {
        Self {
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            placeholder: DEFAULT_SECRET_PLACEHOLDER.to_string(),
            secret: None,
        }
    }

    pub fn with_output_file(mut self, output_file: impl Into<String>) -> Self {
        self.output_file = output_file.into();
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret;
        self
    }

    pub fn output_file(&self) -> &str {
        &self.output_file
    }

    fn parse_fragment(name: &str, content: &[u8]) -> Result<Option<Mapping>, MergeError> {
        if !(name.ends_with(".yaml") || name.ends_with(".yml")) {
            return Err(MergeError::UnsupportedFragment {
                name: name.to_string(),
                reason: "expected a .yaml or .yml document".to_string(),
            });
        }

        let doc: Value = serde_yaml::from_slice(content).map_err(|source| MergeError::Malformed {
            name: name.to_string(),
            source,
        })?;

        match doc {
            Value::Null => Ok(None),
            Value::Mapping(mapping) => Ok(Some(mapping)),
            _ => Err(MergeError::NotAMapping {
                name: name.to_string(),
            }),
        }
    }
}

/// Merge `overlay` into `base`; mappings recurse, everything else replaces.
pub fn deep_merge(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        match value {
            Value::Mapping(incoming) => match base.get_mut(&key) {
                Some(Value::Mapping(existing)) => deep_merge(existing, incoming),
                _ => {
                    base.insert(key, Value::Mapping(incoming));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}

impl MergeStrategy for YamlMergeStrategy {
    fn merge(&self, raw: &RawConfigSet) -> Result<OutputConfigSet, MergeError> {
        let mut names: Vec<&String> = raw.keys().collect();
        names.sort_by(|a, b| {
            (a.as_str() == IDENTITY_FRAGMENT, a).cmp(&(b.as_str() == IDENTITY_FRAGMENT, b))
        });

        let mut merged = Mapping::new();
        for name in names {
            if let Some(mapping) = Self::parse_fragment(name, &raw[name])? {
                deep_merge(&mut merged, mapping);
            } else {
                debug!(fragment = %name, "skipping empty fragment");
            }
        }

        let mut rendered =
            serde_yaml::to_string(&Value::Mapping(merged)).map_err(MergeError::Serialize)?;
        if let Some(secret) = &self.secret {
            rendered = rendered.replace(&self.placeholder, secret);
        }

        let mut output = OutputConfigSet::new();
        output.insert(self.output_file.clone(), rendered.into_bytes());
        Ok(output)
    }

    fn identity_fragments(&self, identity: &ModuleIdentity) -> Result<RawConfigSet, MergeError> {
        #[derive(Serialize)]
        struct Wrapper<'a> {
            fleetvisor: &'a ModuleIdentity,
        }

        let doc = serde_yaml::to_string(&Wrapper {
            fleetvisor: identity,
        })
        .map_err(MergeError::Serialize)?;

        let mut fragments = RawConfigSet::new();
        fragments.insert(IDENTITY_FRAGMENT.to_string(), doc.into_bytes());
        Ok(fragments)
    }
}
