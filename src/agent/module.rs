// src/agent/module.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::errors::{FleetvisorError, Result};
use crate::exec::{LaunchSpec, ProcessLauncher, SupervisionHandle, split_command};
use crate::history::HistoryTracker;
use crate::materialize::Materializer;
use crate::merge::{MergeError, ModuleIdentity};
use crate::types::RawConfigSet;

use super::{ModuleEvent, ModuleSettings, ModuleStatus};

/// One supervised module: owns its materializer, its history and at most one
/// running supervisor generation.
///
/// All state is mutated from [`AgentModule::run`] only, one event at a time.
pub struct AgentModule {
    settings: ModuleSettings,
    identity: ModuleIdentity,
    materializer: Materializer,
    history: Box<dyn HistoryTracker>,
    launcher: Arc<dyn ProcessLauncher>,
    current: Option<SupervisionHandle>,
    generation: u64,
    active_location: Option<PathBuf>,
    status_tx: watch::Sender<ModuleStatus>,
}

impl fmt::Debug for AgentModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentModule")
            .field("settings", &self.settings)
            .field("generation", &self.generation)
            .field("active_location", &self.active_location)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl AgentModule {
    pub fn new(
        settings: ModuleSettings,
        identity: ModuleIdentity,
        materializer: Materializer,
        history: Box<dyn HistoryTracker>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ModuleStatus::Idle);
        Self {
            settings,
            identity,
            materializer,
            history,
            launcher,
            current: None,
            generation: 0,
            active_location: None,
            status_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Subscribe to status changes.
    pub fn status(&self) -> watch::Receiver<ModuleStatus> {
        self.status_tx.subscribe()
    }

    /// Generation of the most recently started supervisor (0 = none yet).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_location(&self) -> Option<&Path> {
        self.active_location.as_deref()
    }

    /// Apply one pushed fragment set.
    ///
    /// Returns `Ok(true)` when a new supervisor generation was started and
    /// `Ok(false)` when the effective configuration did not change.
    pub async fn handle_push(&mut self, mut fragments: RawConfigSet) -> Result<bool> {
        let identity = self
            .materializer
            .strategy()
            .identity_fragments(&self.identity)?;
        if let Some(name) = identity.keys().find(|name| fragments.contains_key(*name)) {
            return Err(MergeError::ReservedName { name: name.clone() }.into());
        }
        fragments.extend(identity);

        let location = self.materializer.handle(&fragments)?;
        if self.active_location.as_deref() == Some(location.as_path()) {
            debug!(
                module = %self.settings.name,
                location = ?location,
                "configuration unchanged; keeping current supervisor"
            );
            return Ok(false);
        }

        self.publish(ModuleStatus::Applying);
        let args = self.child_args(&location)?;

        self.history
            .push(&location)
            .map_err(|e| FleetvisorError::History {
                location: location.clone(),
                message: format!("{e:#}"),
            })?;

        self.stop_current().await?;

        self.generation += 1;
        let spec = LaunchSpec {
            module: self.settings.name.clone(),
            generation: self.generation,
            program: self.settings.binary.clone(),
            args,
            location: location.clone(),
        };
        self.current = Some(SupervisionHandle::spawn(self.launcher.as_ref(), spec));
        self.active_location = Some(location.clone());

        info!(
            module = %self.settings.name,
            generation = self.generation,
            location = ?location,
            "started new supervisor generation"
        );
        self.publish(ModuleStatus::Running {
            generation: self.generation,
            location,
        });
        Ok(true)
    }

    /// Main event loop.
    ///
    /// Runs until `Shutdown`, until every sender is gone, or until a fatal
    /// error. Supervision ending on its own is always fatal.
    pub async fn run(mut self, mut events: mpsc::Receiver<ModuleEvent>) -> Result<()> {
        info!(module = %self.settings.name, "module event loop started");

        let outcome = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ModuleEvent::ConfigPushed { fragments }) => {
                        debug!(module = %self.settings.name, fragments = fragments.len(), "config pushed");
                        if let Err(err) = self.handle_push(fragments).await {
                            break Err(err);
                        }
                    }
                    Some(ModuleEvent::Shutdown) => {
                        info!(module = %self.settings.name, "shutdown requested");
                        break Ok(());
                    }
                    None => {
                        info!(module = %self.settings.name, "event channel closed; exiting");
                        break Ok(());
                    }
                },
                res = wait_current(&mut self.current) => {
                    let generation = self.generation;
                    self.current = None;
                    break match res {
                        Ok(()) => Err(FleetvisorError::Other(anyhow!(
                            "supervisor generation {generation} stopped without being cancelled"
                        ))),
                        Err(err) => Err(err),
                    };
                }
            }
        };

        match outcome {
            Ok(()) => {
                self.stop_current().await?;
                self.publish(ModuleStatus::Stopped);
                info!(module = %self.settings.name, "module stopped");
                Ok(())
            }
            Err(err) => {
                error!(module = %self.settings.name, error = %err, "module failed");
                self.publish(ModuleStatus::Failed(err.to_string()));
                if let Err(stop_err) = self.stop_current().await {
                    warn!(
                        module = %self.settings.name,
                        error = %stop_err,
                        "supervisor failed while stopping a failed module"
                    );
                }
                Err(err)
            }
        }
    }

    fn child_args(&self, location: &Path) -> Result<Vec<String>> {
        let config_file = location.join(&self.settings.output_file);
        let mut args = vec![
            "--config".to_string(),
            config_file.to_string_lossy().into_owned(),
        ];
        args.extend(split_command(&self.settings.args)?);
        Ok(args)
    }

    /// Cancel the running generation, if any, and wait until it is gone.
    async fn stop_current(&mut self) -> Result<()> {
        match self.current.take() {
            Some(handle) => {
                let generation = handle.generation();
                handle.cancel_and_wait().await?;
                debug!(module = %self.settings.name, generation, "previous generation stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn publish(&self, status: ModuleStatus) {
        debug!(module = %self.settings.name, ?status, "module status");
        self.status_tx.send_replace(status);
    }
}

/// Resolves when the current generation ends; pending while there is none.
async fn wait_current(current: &mut Option<SupervisionHandle>) -> Result<()> {
    match current {
        Some(handle) => handle.finished().await,
        None => std::future::pending().await,
    }
}
