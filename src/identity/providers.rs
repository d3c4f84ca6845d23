// src/identity/providers.rs

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::IdentifierProvider;

/// A fixed identifier, e.g. `instance_id` from the agent config.
#[derive(Debug, Clone)]
pub struct StaticProvider(pub String);

impl IdentifierProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn identifier(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Reads an environment variable; unset counts as empty.
#[derive(Debug, Clone)]
pub struct EnvProvider {
    var: String,
}

impl EnvProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl IdentifierProvider for EnvProvider {
    fn name(&self) -> &str {
        &self.var
    }

    fn identifier(&self) -> Result<String> {
        Ok(std::env::var(&self.var).unwrap_or_default())
    }
}

/// Reads the first existing file among `paths`, trimmed.
#[derive(Debug, Clone)]
pub struct FileProvider {
    label: String,
    paths: Vec<PathBuf>,
}

impl FileProvider {
    pub fn new(label: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            label: label.into(),
            paths,
        }
    }

    /// Kernel hostname, falling back to `/etc/hostname`.
    pub fn hostname() -> Self {
        Self::new(
            "hostname",
            vec![
                PathBuf::from("/proc/sys/kernel/hostname"),
                PathBuf::from("/etc/hostname"),
            ],
        )
    }

    /// systemd / dbus machine id.
    pub fn machine_id() -> Self {
        Self::new(
            "machine-id",
            vec![
                PathBuf::from("/etc/machine-id"),
                PathBuf::from("/var/lib/dbus/machine-id"),
            ],
        )
    }
}

impl IdentifierProvider for FileProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn identifier(&self) -> Result<String> {
        for path in &self.paths {
            if path.is_file() {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("reading identifier from {:?}", path))?;
                return Ok(content.trim().to_string());
            }
        }
        Ok(String::new())
    }
}

/// Parse a provider spec from the agent config.
///
/// Accepted forms: `hostname`, `machine-id`, `env:<VAR>`, `static:<VALUE>`.
pub fn parse_provider_spec(spec: &str) -> std::result::Result<Box<dyn IdentifierProvider>, String> {
    let spec = spec.trim();
    match spec {
        "hostname" => return Ok(Box::new(FileProvider::hostname())),
        "machine-id" => return Ok(Box::new(FileProvider::machine_id())),
        _ => {}
    }

    match spec.split_once(':') {
        Some(("env", var)) if !var.is_empty() => Ok(Box::new(EnvProvider::new(var))),
        Some(("static", value)) if !value.is_empty() => {
            Ok(Box::new(StaticProvider(value.to_string())))
        }
        _ => Err(format!(
            "invalid identity provider '{spec}' (expected hostname, machine-id, env:<VAR> or static:<VALUE>)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_provider_trims_and_falls_through_missing_paths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  node-42  ").unwrap();

        let provider = FileProvider::new(
            "test",
            vec![PathBuf::from("/no/such/file"), file.path().to_path_buf()],
        );
        assert_eq!(provider.identifier().unwrap(), "node-42");
    }

    #[test]
    fn file_provider_without_files_is_empty() {
        let provider = FileProvider::new("test", vec![PathBuf::from("/no/such/file")]);
        assert_eq!(provider.identifier().unwrap(), "");
    }

    #[test]
    fn unset_env_var_is_empty() {
        let provider = EnvProvider::new("FLEETVISOR_TEST_SURELY_UNSET_VAR");
        assert_eq!(provider.identifier().unwrap(), "");
    }

    #[test]
    fn parses_known_specs() {
        assert_eq!(parse_provider_spec("hostname").unwrap().name(), "hostname");
        assert_eq!(parse_provider_spec("machine-id").unwrap().name(), "machine-id");
        assert_eq!(parse_provider_spec("env:HOST_ID").unwrap().name(), "HOST_ID");
        assert_eq!(
            parse_provider_spec("static:abc").unwrap().identifier().unwrap(),
            "abc"
        );
    }

    #[test]
    fn rejects_unknown_specs() {
        assert!(parse_provider_spec("dns").is_err());
        assert!(parse_provider_spec("env:").is_err());
    }
}
