//! Fixed-interval polling for asynchronous remote state.
//!
//! The remote side reports readiness (branch ready, deploy finished, branch
//! gone) only through repeated list calls. `Poller` re-runs a check at a fixed
//! interval until it yields a value, optionally giving up after a maximum
//! number of checks. Sleeping goes through [`Sleeper`] so tests observe the
//! schedule without waiting.

use crate::error::{DeployError, Result};
use std::time::Duration;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the check succeeds.
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    pub const DEFAULT: Self = Self {
        interval: Duration::from_secs(1),
        max_attempts: None,
    };

    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

pub struct Poller {
    policy: PollPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self::with_sleeper(policy, Box::new(ThreadSleeper))
    }

    pub fn with_sleeper(policy: PollPolicy, sleeper: Box<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Run `check` until it returns `Some`. The first check runs immediately;
    /// the interval is slept only between checks. Errors from `check` abort.
    pub fn until<T>(&self, what: &str, mut check: impl FnMut() -> Result<Option<T>>) -> Result<T> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if let Some(value) = check()? {
                tracing::debug!(what, attempts, "poll satisfied");
                return Ok(value);
            }
            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(DeployError::PollExhausted {
                    what: what.to_string(),
                    attempts,
                });
            }
            tracing::debug!(what, attempts, "waiting");
            self.sleeper.sleep(self.policy.interval);
        }
    }
}
