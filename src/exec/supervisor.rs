// src/exec/supervisor.rs

//! Single-child process supervisor.
//!
//! A [`Supervisor`] starts one command, relays its stdout/stderr to our own
//! stderr, and restarts it whenever it exits, as long as its [`Backoff`]
//! allows. It stops when cancelled, when the backoff gives up, or when the
//! command cannot be spawned at all.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{FleetvisorError, Result};
use crate::exec::backoff::{Backoff, BackoffDecision};

/// Lifecycle state of a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    WaitingBackoff,
    Stopped,
}

pub struct Supervisor {
    program: String,
    args: Vec<String>,
    backoff: Box<dyn Backoff>,
    state: SupervisorState,
    restarts: u32,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("state", &self.state)
            .field("restarts", &self.restarts)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(program: impl Into<String>, args: Vec<String>, backoff: Box<dyn Backoff>) -> Self {
        Self {
            program: program.into(),
            args,
            backoff,
            state: SupervisorState::Stopped,
            restarts: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Number of times the child was started again after exiting.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Supervise the command until cancelled or until supervision fails.
    ///
    /// Returns:
    /// - `Err(Cancelled)` when `cancel` fires; no restart is attempted.
    /// - `Ok(())` when the cancel sender is dropped without firing.
    /// - `Err(Spawn)` if the command cannot be started (never retried).
    /// - `Err(BackoffExhausted)` once the backoff gives up.
    ///
    /// On cancel the running child is killed and reaped before this returns,
    /// so a new generation never overlaps the old one. `kill_on_drop` covers
    /// the case where the future itself is dropped.
    pub async fn run(&mut self, mut cancel: oneshot::Receiver<()>) -> Result<()> {
        loop {
            self.transition(SupervisorState::Starting);

            let mut child = match self.spawn_child() {
                Ok(child) => child,
                Err(err) => {
                    error!(program = %self.program, error = %err, "failed to start supervised process");
                    self.transition(SupervisorState::Stopped);
                    return Err(err);
                }
            };

            self.transition(SupervisorState::Running);
            info!(
                program = %self.program,
                pid = child.id(),
                restarts = self.restarts,
                "supervised process started"
            );

            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    warn!(
                        program = %self.program,
                        exit_code = status.code().unwrap_or(-1),
                        success = status.success(),
                        restarts = self.restarts,
                        "supervised process exited"
                    );
                }
                res = &mut cancel => {
                    self.reap(&mut child).await;
                    return self.stop_on_cancel(res);
                }
            }

            self.transition(SupervisorState::WaitingBackoff);
            let delay = match self.backoff.next_delay() {
                BackoffDecision::Wait(delay) => delay,
                BackoffDecision::GiveUp => {
                    error!(
                        program = %self.program,
                        restarts = self.restarts,
                        "backoff exhausted; giving up on supervised process"
                    );
                    self.transition(SupervisorState::Stopped);
                    return Err(FleetvisorError::BackoffExhausted {
                        program: self.program.clone(),
                        restarts: self.restarts,
                    });
                }
            };

            debug!(program = %self.program, delay_ms = delay.as_millis() as u64, "waiting before restart");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                res = &mut cancel => {
                    return self.stop_on_cancel(res);
                }
            }

            self.restarts += 1;
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            debug!(program = %self.program, from = ?self.state, to = ?next, "supervisor state change");
            self.state = next;
        }
    }

    /// Kill the child and wait for it to exit.
    async fn reap(&self, child: &mut Child) {
        let pid = child.id();
        if let Err(e) = child.kill().await {
            warn!(program = %self.program, pid, error = %e, "failed to kill supervised process");
        } else {
            debug!(program = %self.program, pid, "supervised process killed");
        }
    }

    fn stop_on_cancel(
        &mut self,
        res: std::result::Result<(), oneshot::error::RecvError>,
    ) -> Result<()> {
        self.transition(SupervisorState::Stopped);
        match res {
            Ok(()) => {
                info!(program = %self.program, "supervision cancelled");
                Err(FleetvisorError::Cancelled)
            }
            Err(_) => {
                debug!(program = %self.program, "cancel handle dropped; stopping supervision");
                Ok(())
            }
        }
    }

    fn spawn_child(&self) -> Result<Child> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| FleetvisorError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if let Some(stdout) = child.stdout.take() {
            relay_to_stderr(stdout, self.program.clone(), "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            relay_to_stderr(stderr, self.program.clone(), "stderr");
        }

        Ok(child)
    }
}

/// Copy a child stream to our stderr, byte for byte, one line at a time.
fn relay_to_stderr<R>(stream: R, program: String, name: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut sink = tokio::io::stderr();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if sink.write_all(&buf).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(program = %program, stream = name, error = %e, "child output relay failed");
                    break;
                }
            }
        }

        let _ = sink.flush().await;
        debug!(program = %program, stream = name, "child output relay finished");
    })
}
