//! Retry delay policy for session establishment
//!
//! The exponential base is capped at `max_backoff_ms`, scaled by a jitter
//! factor drawn uniformly from `[0.85, 1.15]`, then capped again. Jitter keeps
//! many sessions that failed together from retrying in lockstep.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

pub const JITTER_MIN: f64 = 0.85;
pub const JITTER_MAX: f64 = 1.15;

/// Un-jittered delay in milliseconds before retry number `attempt` (1-based)
pub fn base_delay_ms(attempt: u32, cfg: &RetryConfig) -> f64 {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = cfg.initial_backoff_ms as f64 * cfg.backoff_factor.powi(exponent);
    raw.min(cfg.max_backoff_ms as f64)
}

/// Delay before retry number `attempt` (1-based), never above `max_backoff_ms`
pub fn next_delay<R: Rng>(attempt: u32, cfg: &RetryConfig, rng: &mut R) -> Duration {
    let base = base_delay_ms(attempt, cfg);
    let jitter = rng.random_range(JITTER_MIN..=JITTER_MAX);
    let delay_ms = (base * jitter).min(cfg.max_backoff_ms as f64).max(0.0);
    Duration::from_micros((delay_ms * 1000.0).round() as u64)
}

/// Retry bookkeeping for one session-creation call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetryState {
    /// Failed attempts so far
    pub retries: u32,
    /// Base delay used for the most recent retry
    pub current_backoff_ms: f64,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once
    /// `max_retries` retries have been spent.
    pub fn on_failure<R: Rng>(&mut self, cfg: &RetryConfig, rng: &mut R) -> Option<Duration> {
        self.retries += 1;
        if self.retries > cfg.max_retries {
            return None;
        }
        self.current_backoff_ms = base_delay_ms(self.retries, cfg);
        Some(next_delay(self.retries, cfg, rng))
    }
}
