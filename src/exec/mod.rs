// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] splits configured command lines into argument vectors.
//! - [`backoff`] holds the restart policies.
//! - [`supervisor`] runs and restarts a single child process.
//! - [`backend`] provides the `ProcessLauncher` trait, the production
//!   `RealProcessLauncher`, and `SupervisionHandle` for one running
//!   generation.

pub mod backend;
pub mod backoff;
pub mod command;
pub mod supervisor;

pub use backend::{LaunchSpec, ProcessLauncher, RealProcessLauncher, SupervisionHandle};
pub use backoff::{Backoff, BackoffDecision, BackoffPolicy, ExponentialBackoff, FixedBackoff};
pub use command::split_command;
pub use supervisor::{Supervisor, SupervisorState};
