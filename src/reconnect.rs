//! Reconnect policy: bounded retries with exponential backoff.
//!
//! The original left reconnection as a commented-out `setTimeout`. Here the
//! policy is explicit: a fixed number of attempts, delays doubling from a
//! base up to a cap with a little jitter, and a terminal `Disconnected`
//! status once attempts run out.

use std::time::Duration;

use rand::Rng;
use serde::Serialize;

/// Connection lifecycle as surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    /// Terminal. The session will not dial again.
    Disconnected,
}

/// Tunable reconnect parameters.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// One reconnect episode. Reset after a successful connection.
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Backoff { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// The delay before the next attempt, or `None` once attempts are
    /// exhausted. Doubles per attempt, capped, plus up to 10% jitter.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let exp = self
            .policy
            .base_delay
            .checked_mul(1u32 << self.attempt.min(16))
            .unwrap_or(self.policy.max_delay)
            .min(self.policy.max_delay);
        self.attempt += 1;

        let jitter_cap = (exp.as_millis() as u64 / 10).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        Some(exp + Duration::from_millis(jitter))
    }

    /// A connection succeeded; the next drop starts a fresh episode.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
