// src/exec/backoff.rs

//! Restart backoff strategies.
//!
//! A [`Backoff`] is consulted by the supervisor every time its child exits on
//! its own. It owns whatever counters it needs; a fresh instance is built for
//! every supervisor generation, so state never leaks between configurations.

use std::time::Duration;

use crate::types::BackoffKind;

/// Default delay between restarts.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Default ceiling for exponential backoff.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// What the supervisor should do after a child exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Sleep this long, then restart.
    Wait(Duration),
    /// Stop restarting; supervision fails.
    GiveUp,
}

/// Stateful restart policy.
pub trait Backoff: Send + Sync {
    /// Decide what happens after the next exit. Each call counts as one
    /// attempt.
    fn next_delay(&mut self) -> BackoffDecision;
}

/// Same delay every time, optionally bounded by a number of attempts.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            attempts: 0,
        }
    }

    /// Give up once `max` restarts have been granted.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

impl Backoff for FixedBackoff {
    fn next_delay(&mut self) -> BackoffDecision {
        if self.max_attempts.is_some_and(|max| self.attempts >= max) {
            return BackoffDecision::GiveUp;
        }
        self.attempts += 1;
        BackoffDecision::Wait(self.delay)
    }
}

/// Doubling delay capped at `max_delay`, optionally bounded by attempts.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max_delay: Duration) -> Self {
        Self {
            current: initial,
            max_delay,
            max_attempts: None,
            attempts: 0,
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&mut self) -> BackoffDecision {
        if self.max_attempts.is_some_and(|max| self.attempts >= max) {
            return BackoffDecision::GiveUp;
        }
        self.attempts += 1;
        let delay = self.current.min(self.max_delay);
        self.current = self.current.saturating_mul(2).min(self.max_delay);
        BackoffDecision::Wait(delay)
    }
}

/// Resolved, copyable description of a module's backoff; builds a fresh
/// [`Backoff`] for every supervisor generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub delay: Duration,
    pub max_delay: Duration,
    /// `0` means unlimited.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Fixed,
            delay: DEFAULT_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: 0,
        }
    }
}

impl BackoffPolicy {
    pub fn build(&self) -> Box<dyn Backoff> {
        match self.kind {
            BackoffKind::Fixed => {
                let mut b = FixedBackoff::new(self.delay);
                if self.max_attempts > 0 {
                    b = b.with_max_attempts(self.max_attempts);
                }
                Box::new(b)
            }
            BackoffKind::Exponential => {
                let mut b = ExponentialBackoff::new(self.delay, self.max_delay);
                if self.max_attempts > 0 {
                    b = b.with_max_attempts(self.max_attempts);
                }
                Box::new(b)
            }
        }
    }
}
