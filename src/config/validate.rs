// src/config/validate.rs

use std::path::{Component, Path};

use globset::Glob;

use crate::config::model::{ConfigFile, ModuleConfig, RawConfigFile};
use crate::errors::{FleetvisorError, Result};
use crate::exec::split_command;
use crate::identity::parse_provider_spec;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FleetvisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.agent, raw.module))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_modules(cfg)?;
    validate_agent(cfg)?;
    for (name, module) in cfg.module.iter() {
        validate_module(name, module)?;
    }
    Ok(())
}

fn config_error(msg: impl Into<String>) -> FleetvisorError {
    FleetvisorError::ConfigError(msg.into())
}

fn ensure_has_modules(cfg: &RawConfigFile) -> Result<()> {
    if cfg.module.is_empty() {
        return Err(config_error(
            "config must contain at least one [module.<name>] section",
        ));
    }
    Ok(())
}

fn validate_agent(cfg: &RawConfigFile) -> Result<()> {
    if cfg.agent.root.as_os_str().is_empty() {
        return Err(config_error("[agent].root must not be empty"));
    }

    let has_explicit_id = cfg
        .agent
        .instance_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());
    if !has_explicit_id && cfg.agent.identity.is_empty() {
        return Err(config_error(
            "[agent] needs either instance_id or at least one identity provider",
        ));
    }

    if cfg.agent.history_keep == 1 {
        return Err(config_error(
            "[agent].history_keep must be 0 (keep all) or at least 2; the running location is still in use while its replacement is recorded",
        ));
    }

    for spec in cfg.agent.identity.iter() {
        parse_provider_spec(spec).map_err(|e| config_error(format!("[agent].identity: {e}")))?;
    }
    Ok(())
}

fn validate_module(name: &str, module: &ModuleConfig) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(config_error(format!(
            "module name '{name}' cannot be used as a directory name"
        )));
    }

    if module.binary.trim().is_empty() {
        return Err(config_error(format!(
            "module '{name}' has an empty `binary`"
        )));
    }

    split_command(&module.args)
        .map_err(|e| config_error(format!("module '{name}' has invalid `args`: {e}")))?;

    if module.include.is_empty() {
        return Err(config_error(format!(
            "module '{name}' must include at least one fragment pattern"
        )));
    }
    for pattern in module.include.iter() {
        Glob::new(pattern).map_err(|e| {
            config_error(format!(
                "module '{name}' has invalid include pattern '{pattern}': {e}"
            ))
        })?;
    }

    if module.placeholder.is_empty() {
        return Err(config_error(format!(
            "module '{name}' has an empty `placeholder`"
        )));
    }

    if !is_plain_relative(Path::new(&module.output_file)) {
        return Err(config_error(format!(
            "module '{name}': output_file '{}' must be a relative path inside the output location",
            module.output_file
        )));
    }

    validate_backoff(name, module)
}

fn validate_backoff(name: &str, module: &ModuleConfig) -> Result<()> {
    let policy = module
        .backoff
        .policy()
        .map_err(|e| config_error(format!("module '{name}' backoff: {e}")))?;

    if policy.delay.is_zero() || policy.max_delay.is_zero() {
        return Err(config_error(format!(
            "module '{name}' backoff durations must be greater than zero"
        )));
    }
    if policy.max_delay < policy.delay {
        return Err(config_error(format!(
            "module '{name}' backoff: max_delay ({}) is shorter than delay ({})",
            module.backoff.max_delay, module.backoff.delay
        )));
    }
    Ok(())
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    const MINIMAL: &str = r#"
[module.collector]
binary = "/usr/bin/otelcol"
fragments = "conf.d"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse(MINIMAL).unwrap();
        let module = &cfg.module["collector"];
        assert_eq!(module.output_file, "config.yaml");
        assert_eq!(module.placeholder, "$API_KEY");
        assert_eq!(module.include, vec!["*.yaml", "*.yml"]);
        assert_eq!(cfg.agent.history_keep, 5);

        let policy = module.backoff.policy().unwrap();
        assert_eq!(policy.delay, std::time::Duration::from_secs(1));
        assert_eq!(policy.max_delay, std::time::Duration::from_secs(30));
    }

    #[test]
    fn no_modules_is_an_error() {
        let err = parse("[agent]\nroot = \"/tmp\"\n").unwrap_err();
        assert!(err.to_string().contains("at least one [module.<name>]"));
    }

    #[test]
    fn quoted_args_are_rejected() {
        let src = format!("{MINIMAL}args = \"--name 'two words'\"\n");
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("invalid `args`"), "{err}");
    }

    #[test]
    fn escaping_output_file_is_rejected() {
        for bad in ["../config.yaml", "/etc/config.yaml", ""] {
            let src = format!("{MINIMAL}output_file = \"{bad}\"\n");
            assert!(parse(&src).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn backoff_bounds_are_checked() {
        let zero = format!("{MINIMAL}[module.collector.backoff]\ndelay = \"0s\"\n");
        assert!(parse(&zero).is_err());

        let inverted = format!(
            "{MINIMAL}[module.collector.backoff]\nkind = \"exponential\"\ndelay = \"10s\"\nmax_delay = \"1s\"\n"
        );
        let err = parse(&inverted).unwrap_err();
        assert!(err.to_string().contains("shorter than delay"), "{err}");
    }

    #[test]
    fn history_keep_of_one_is_rejected() {
        let src = format!("[agent]\nhistory_keep = 1\n{MINIMAL}");
        assert!(parse(&src).is_err());
    }

    #[test]
    fn unknown_identity_provider_is_rejected() {
        let src = format!("[agent]\nidentity = [\"dns\"]\n{MINIMAL}");
        assert!(parse(&src).is_err());
    }

    #[test]
    fn unknown_backoff_kind_fails_deserialization() {
        let src = format!("{MINIMAL}[module.collector.backoff]\nkind = \"jitter\"\n");
        let err = parse(&src).unwrap_err();
        assert!(matches!(err, FleetvisorError::TomlError(_)));
    }
}
