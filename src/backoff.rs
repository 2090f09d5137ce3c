// ABOUTME: Exponential backoff with full jitter, shared by gateway reconnect and store health retry.
// ABOUTME: Delay grows by a factor per attempt up to a cap; reset on success.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff tuning, loaded from config with documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First delay in milliseconds
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,
    /// Multiplier applied per failed attempt
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Delay ceiling in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

fn default_initial_ms() -> u64 {
    1_000
}

fn default_factor() -> f64 {
    2.0
}

fn default_max_ms() -> u64 {
    60_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_ms(),
            factor: default_factor(),
            max_ms: default_max_ms(),
        }
    }
}

/// Stateful backoff counter. Not shared across tasks; each retry loop owns one.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of consecutive failures recorded so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failure and return the delay to sleep before the next try.
    ///
    /// Full jitter: the returned delay is uniform in [0, current_ceiling],
    /// where the ceiling doubles (by `factor`) per attempt up to `max_ms`.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = (self.config.initial_ms as f64 * self.config.factor.powi(self.attempt as i32))
            .min(self.config.max_ms as f64) as u64;
        self.attempt = self.attempt.saturating_add(1);
        let jittered = rand::thread_rng().gen_range(0..=ceiling.max(1));
        Duration::from_millis(jittered)
    }

    /// Reset after a success so the next failure starts from the initial delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial: u64, factor: f64, max: u64) -> BackoffConfig {
        BackoffConfig {
            initial_ms: initial,
            factor,
            max_ms: max,
        }
    }

    #[test]
    fn delays_stay_under_growing_ceiling() {
        let mut backoff = Backoff::new(config(100, 2.0, 1_000));
        assert!(backoff.next_delay() <= Duration::from_millis(100));
        assert!(backoff.next_delay() <= Duration::from_millis(200));
        assert!(backoff.next_delay() <= Duration::from_millis(400));
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn ceiling_is_capped() {
        let mut backoff = Backoff::new(config(100, 10.0, 250));
        for _ in 0..10 {
            assert!(backoff.next_delay() <= Duration::from_millis(250));
        }
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut backoff = Backoff::new(config(100, 2.0, 1_000));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay() <= Duration::from_millis(100));
    }
}
