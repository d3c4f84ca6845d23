//! Fakes for the agent's pluggable seams.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use fleetvisor::errors::FleetvisorError;
use fleetvisor::exec::backend::{LaunchSpec, ProcessLauncher, SupervisionFuture};
use fleetvisor::exec::{Backoff, BackoffDecision};
use fleetvisor::history::HistoryTracker;
use fleetvisor::merge::{MergeError, MergeStrategy};
use fleetvisor::types::{OutputConfigSet, RawConfigSet};

/// How a [`RecordingLauncher`]'s supervision behaves once launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchBehaviour {
    /// Run until cancelled, like a healthy child.
    WaitForCancel,
    /// Immediately report that the backoff gave up.
    Exhaust,
}

#[derive(Debug, Default)]
struct LauncherState {
    launched: Vec<LaunchSpec>,
    cancelled: Vec<u64>,
    running: usize,
    max_running: usize,
}

/// Launcher that records every launch instead of spawning processes.
#[derive(Debug, Clone)]
pub struct RecordingLauncher {
    behaviour: LaunchBehaviour,
    state: Arc<Mutex<LauncherState>>,
}

impl RecordingLauncher {
    pub fn new(behaviour: LaunchBehaviour) -> Self {
        Self {
            behaviour,
            state: Arc::new(Mutex::new(LauncherState::default())),
        }
    }

    pub fn launched(&self) -> Vec<LaunchSpec> {
        self.state.lock().unwrap().launched.clone()
    }

    /// Generations that stopped because they were cancelled.
    pub fn cancelled(&self) -> Vec<u64> {
        self.state.lock().unwrap().cancelled.clone()
    }

    /// Highest number of generations that were ever running at once.
    pub fn max_running(&self) -> usize {
        self.state.lock().unwrap().max_running
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(&self, spec: LaunchSpec, cancel: oneshot::Receiver<()>) -> SupervisionFuture {
        let state = Arc::clone(&self.state);
        let behaviour = self.behaviour;
        let generation = spec.generation;
        let program = spec.program.clone();
        state.lock().unwrap().launched.push(spec);

        Box::pin(async move {
            {
                let mut s = state.lock().unwrap();
                s.running += 1;
                s.max_running = s.max_running.max(s.running);
            }

            let result = match behaviour {
                LaunchBehaviour::WaitForCancel => match cancel.await {
                    Ok(()) => {
                        state.lock().unwrap().cancelled.push(generation);
                        Err(FleetvisorError::Cancelled)
                    }
                    Err(_) => Ok(()),
                },
                LaunchBehaviour::Exhaust => Err(FleetvisorError::BackoffExhausted {
                    program,
                    restarts: 0,
                }),
            };

            state.lock().unwrap().running -= 1;
            result
        })
    }
}

/// History tracker that keeps pushed locations in memory and can be told
/// to fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    pushed: Arc<Mutex<Vec<PathBuf>>>,
    fail: Arc<Mutex<bool>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn pushed(&self) -> Vec<PathBuf> {
        self.pushed.lock().unwrap().clone()
    }
}

impl HistoryTracker for MemoryHistory {
    fn push(&mut self, location: &Path) -> anyhow::Result<()> {
        if *self.fail.lock().unwrap() {
            anyhow::bail!("history store unavailable");
        }
        self.pushed.lock().unwrap().push(location.to_path_buf());
        Ok(())
    }
}

/// Merge strategy that copies fragments through unchanged, renaming every
/// `in` prefix to `out` (`inFile1` -> `outFile1`, `in/File2` -> `out/File2`).
///
/// Fragments without the prefix are rejected.
#[derive(Debug, Clone, Default)]
pub struct RenameStrategy;

impl MergeStrategy for RenameStrategy {
    fn merge(&self, raw: &RawConfigSet) -> Result<OutputConfigSet, MergeError> {
        raw.iter()
            .map(|(name, content)| match name.strip_prefix("in") {
                Some(rest) => Ok((format!("out{rest}"), content.clone())),
                None => Err(MergeError::UnsupportedFragment {
                    name: name.clone(),
                    reason: "expected a name starting with \"in\"".to_string(),
                }),
            })
            .collect()
    }
}

/// Backoff replaying a fixed script of decisions, then giving up.
#[derive(Debug, Clone)]
pub struct RecordingBackoff {
    script: VecDeque<BackoffDecision>,
    calls: Arc<AtomicUsize>,
}

impl RecordingBackoff {
    pub fn new(script: impl IntoIterator<Item = BackoffDecision>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `next_delay` calls, readable after the backoff has
    /// been moved into a supervisor.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Backoff for RecordingBackoff {
    fn next_delay(&mut self) -> BackoffDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.pop_front().unwrap_or(BackoffDecision::GiveUp)
    }
}
