// src/exec/backend.rs

//! Pluggable launcher abstraction.
//!
//! The agent module talks to a `ProcessLauncher` instead of building
//! supervisors itself. Production uses [`RealProcessLauncher`]; tests can
//! provide a launcher that records launches without spawning processes.
//!
//! Each launch runs as its own Tokio task wrapped in a [`SupervisionHandle`],
//! which carries the generation number, the cancel sender and the task's
//! join handle.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use anyhow::anyhow;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{FleetvisorError, Result};
use crate::exec::backoff::BackoffPolicy;
use crate::exec::supervisor::Supervisor;
use crate::types::ModuleName;

/// Everything needed to start one supervisor generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub module: ModuleName,
    pub generation: u64,
    pub program: String,
    pub args: Vec<String>,
    /// Output location the child was pointed at.
    pub location: PathBuf,
}

/// Future returned by a launcher; resolves when supervision ends.
pub type SupervisionFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// Trait abstracting how a module's child process is supervised.
pub trait ProcessLauncher: Send + Sync {
    /// Build the supervision future for `spec`. It must resolve with
    /// `Err(Cancelled)` (or `Ok(())`) once `cancel` fires or is dropped.
    fn launch(&self, spec: LaunchSpec, cancel: oneshot::Receiver<()>) -> SupervisionFuture;
}

/// Real launcher: runs a [`Supervisor`] with a fresh backoff per generation.
#[derive(Debug, Clone, Default)]
pub struct RealProcessLauncher {
    policy: BackoffPolicy,
}

impl RealProcessLauncher {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }
}

impl ProcessLauncher for RealProcessLauncher {
    fn launch(&self, spec: LaunchSpec, cancel: oneshot::Receiver<()>) -> SupervisionFuture {
        let backoff = self.policy.build();

        Box::pin(async move {
            info!(
                module = %spec.module,
                generation = spec.generation,
                location = ?spec.location,
                "starting supervisor"
            );
            let mut supervisor = Supervisor::new(spec.program, spec.args, backoff);
            supervisor.run(cancel).await
        })
    }
}

/// One running supervisor generation.
pub struct SupervisionHandle {
    generation: u64,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
    finished: bool,
}

impl std::fmt::Debug for SupervisionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisionHandle")
            .field("generation", &self.generation)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl SupervisionHandle {
    /// Launch `spec` on a new Tokio task.
    pub fn spawn(launcher: &dyn ProcessLauncher, spec: LaunchSpec) -> Self {
        let generation = spec.generation;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let fut = launcher.launch(spec, cancel_rx);

        Self {
            generation,
            cancel: Some(cancel_tx),
            task: tokio::spawn(fut),
            finished: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the supervision task to end on its own.
    ///
    /// Cancel-safe; must not be awaited again once it has returned.
    pub async fn finished(&mut self) -> Result<()> {
        let res = join_result(&mut self.task, self.generation).await;
        self.finished = true;
        res
    }

    /// Cancel this generation and wait until its task has fully terminated.
    ///
    /// A supervisor that stops because it was cancelled is a success here;
    /// any other failure it reports (e.g. it had already given up) is
    /// returned.
    pub async fn cancel_and_wait(mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }

        if let Some(cancel) = self.cancel.take() {
            if cancel.send(()).is_err() {
                debug!(
                    generation = self.generation,
                    "supervisor already finished while cancelling"
                );
            }
        }

        match join_result(&mut self.task, self.generation).await {
            Err(err) if err.is_cancelled() => Ok(()),
            other => other,
        }
    }
}

async fn join_result(task: &mut JoinHandle<Result<()>>, generation: u64) -> Result<()> {
    match task.await {
        Ok(res) => res,
        Err(join_err) => Err(FleetvisorError::Other(anyhow!(
            "supervisor task for generation {generation} failed: {join_err}"
        ))),
    }
}
