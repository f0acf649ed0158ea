//! Reconnect backoff
//!
//! Delays double per consecutive failure, perturbed by bounded jitter, up to a
//! ceiling. The jitter bound stays below half the base delay so a later delay
//! never undercuts an earlier one.

use chat_common::ReconnectSettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Backoff configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    /// Upper bound of the random perturbation, in either direction
    pub jitter: Duration,
}

impl BackoffConfig {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            jitter: Duration::from_millis(250),
        }
    }
}

impl From<&ReconnectSettings> for BackoffConfig {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            base: Duration::from_millis(settings.base_delay_ms),
            max: Duration::from_millis(settings.max_delay_ms),
            jitter: Duration::from_millis(settings.jitter_ms),
        }
    }
}

/// Consecutive-failure backoff state
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    /// Un-jittered delay for the next failure
    nominal: Duration,
    last_delay: Duration,
    attempts: u32,
    rng: StdRng,
}

impl Backoff {
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic jitter for tests
    #[must_use]
    pub fn seeded(config: BackoffConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: BackoffConfig, rng: StdRng) -> Self {
        Self {
            config,
            nominal: config.base,
            last_delay: Duration::ZERO,
            attempts: 0,
            rng,
        }
    }

    /// Consecutive failures since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, advancing the state
    pub fn next_delay(&mut self) -> Duration {
        let base_ms = self.config.base.as_millis() as i64;
        let bound = (self.config.jitter.as_millis() as i64).min(base_ms.saturating_sub(1) / 2);
        let jitter = if bound > 0 {
            self.rng.gen_range(-bound..=bound)
        } else {
            0
        };

        let jittered = (self.nominal.as_millis() as i64 + jitter).max(0) as u64;
        let delay = Duration::from_millis(jittered)
            .min(self.config.max)
            .max(self.last_delay);

        self.attempts = self.attempts.saturating_add(1);
        self.last_delay = delay;
        // Past max + base every jittered value clamps to max
        self.nominal = self
            .nominal
            .saturating_mul(2)
            .min(self.config.max.saturating_add(self.config.base));

        delay
    }

    /// Return to the base delay after a successful connect
    pub fn reset(&mut self) {
        self.nominal = self.config.base;
        self.last_delay = Duration::ZERO;
        self.attempts = 0;
    }
}
