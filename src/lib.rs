// src/lib.rs

pub mod agent;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod history;
pub mod identity;
pub mod logging;
pub mod materialize;
pub mod merge;
pub mod source;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::agent::{AgentModule, ModuleEvent, ModuleSettings};
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{AgentSection, ConfigFile, ModuleConfig};
use crate::errors::FleetvisorError;
use crate::exec::RealProcessLauncher;
use crate::fs::{FileSystem, RealFileSystem};
use crate::history::DirectoryHistory;
use crate::identity::{IdentifierProvider, StaticProvider, parse_provider_spec, resolve_identifier};
use crate::materialize::Materializer;
use crate::merge::{ModuleIdentity, YamlMergeStrategy};
use crate::source::{FragmentFilter, spawn_fragment_watcher};

/// Capacity of each module's event queue.
const MODULE_QUEUE_CAPACITY: usize = 16;

/// High-level entry point used by `main.rs`.
///
/// Loads the agent config, resolves the instance id, then starts one
/// [`AgentModule`] per configured module, each fed by a fragment watcher.
/// Ctrl-C asks every module to shut down. Returns once all modules have
/// stopped, with the first module failure if there was one.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading agent config {:?}", config_path))?;

    let instance_id = resolve_instance_id(&cfg.agent)?;
    info!(instance_id = %instance_id, modules = cfg.module.len(), "resolved instance id");

    if args.dry_run {
        print_dry_run(&cfg, &instance_id);
        return Ok(());
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let mut senders = Vec::new();
    let mut watchers = Vec::new();
    let mut tasks = Vec::new();

    for (name, module_cfg) in cfg.module.iter() {
        let module = build_module(&cfg.agent, &instance_id, name, module_cfg, Arc::clone(&fs))?;
        let (tx, rx) = mpsc::channel::<ModuleEvent>(MODULE_QUEUE_CAPACITY);

        let filter = FragmentFilter::new(&module_cfg.include)?;
        let watcher =
            spawn_fragment_watcher(&module_cfg.fragments, filter, Arc::clone(&fs), tx.clone())
                .with_context(|| format!("starting fragment watcher for module '{name}'"))?;

        watchers.push(watcher);
        senders.push(tx);
        tasks.push((name.clone(), tokio::spawn(module.run(rx))));
    }

    // Ctrl-C → shut every module down.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("Ctrl+C received; stopping modules");
        for tx in senders {
            let _ = tx.send(ModuleEvent::Shutdown).await;
        }
    });

    let mut first_error: Option<anyhow::Error> = None;
    for (name, task) in tasks {
        let outcome = match task.await {
            Ok(res) => res.map_err(anyhow::Error::from),
            Err(join_err) => Err(anyhow::anyhow!("module task panicked: {join_err}")),
        };
        match outcome {
            Ok(()) => debug!(module = %name, "module finished"),
            Err(err) => {
                error!(module = %name, error = %format!("{err:#}"), "module terminated with an error");
                if first_error.is_none() {
                    first_error = Some(err.context(format!("module '{name}' failed")));
                }
            }
        }
    }

    drop(watchers);
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Explicit `instance_id` first, then the configured providers in order.
pub fn resolve_instance_id(agent: &AgentSection) -> Result<String> {
    let mut providers: Vec<Box<dyn IdentifierProvider>> = Vec::new();
    if let Some(id) = agent.instance_id.as_deref() {
        providers.push(Box::new(StaticProvider(id.to_string())));
    }
    for spec in agent.identity.iter() {
        providers.push(parse_provider_spec(spec).map_err(FleetvisorError::ConfigError)?);
    }

    let id = resolve_identifier(&providers);
    if id.is_empty() {
        return Err(FleetvisorError::ConfigError(
            "could not determine an instance id; set [agent].instance_id".to_string(),
        )
        .into());
    }
    if id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(FleetvisorError::ConfigError(format!(
            "instance id '{id}' cannot be used as a directory name"
        ))
        .into());
    }
    Ok(id)
}

/// `{root}/{module}/{instance_id}/config`, the parent of every output
/// location of one module.
pub fn module_root(root: &Path, module: &str, instance_id: &str) -> PathBuf {
    root.join(module).join(instance_id).join("config")
}

fn build_module(
    agent: &AgentSection,
    instance_id: &str,
    name: &str,
    cfg: &ModuleConfig,
    fs: Arc<dyn FileSystem>,
) -> Result<AgentModule> {
    let secret = cfg.secret_env.as_deref().and_then(|var| match std::env::var(var) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(module = %name, var = %var, "secret environment variable is not set");
            None
        }
    });

    let strategy = YamlMergeStrategy::new()
        .with_output_file(&cfg.output_file)
        .with_placeholder(&cfg.placeholder)
        .with_secret(secret);

    let root = module_root(&agent.root, name, instance_id);
    let materializer = Materializer::with_fs(&root, Arc::new(strategy), Arc::clone(&fs));
    let mut history = DirectoryHistory::new(agent.history_keep, fs);
    let adopted = history
        .adopt_existing(&root)
        .with_context(|| format!("loading location history for module '{name}'"))?;
    if adopted > 0 {
        info!(module = %name, adopted, "found configuration locations from a previous run");
    }

    let policy = cfg.backoff.policy().map_err(FleetvisorError::ConfigError)?;
    let launcher = RealProcessLauncher::new(policy);

    let settings = ModuleSettings::new(name, &cfg.binary)
        .with_args(&cfg.args)
        .with_output_file(&cfg.output_file);
    let identity = ModuleIdentity {
        instance_id: instance_id.to_string(),
        module: name.to_string(),
    };

    debug!(module = %name, root = ?root, "module constructed");
    Ok(AgentModule::new(
        settings,
        identity,
        materializer,
        Box::new(history),
        Arc::new(launcher),
    ))
}

/// Print what would be started, without starting it.
fn print_dry_run(cfg: &ConfigFile, instance_id: &str) {
    println!("fleetvisor dry-run");
    println!("  agent.root = {}", cfg.agent.root.display());
    println!("  agent.instance_id = {instance_id}");
    println!("  agent.history_keep = {}", cfg.agent.history_keep);
    println!();

    println!("modules ({}):", cfg.module.len());
    for (name, module) in cfg.module.iter() {
        println!("  - {name}");
        println!("      binary: {}", module.binary);
        if !module.args.is_empty() {
            println!("      args: {}", module.args);
        }
        println!("      fragments: {}", module.fragments.display());
        println!("      include: {:?}", module.include);
        println!(
            "      output: {}/<location>/{}",
            module_root(&cfg.agent.root, name, instance_id).display(),
            module.output_file
        );
        if let Some(ref var) = module.secret_env {
            println!("      secret_env: {var} (placeholder {})", module.placeholder);
        }
        println!(
            "      backoff: {:?} delay={} max_delay={} max_attempts={}",
            module.backoff.kind,
            module.backoff.delay,
            module.backoff.max_delay,
            module.backoff.max_attempts
        );
    }

    debug!("dry-run complete (nothing started)");
}
