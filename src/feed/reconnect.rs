//! Exponential backoff with jitter for feed reconnection (`spec.md` §4.4
//! "Reconnect": base 500 ms, factor 2, cap 30 s), in the spirit of
//! `usealtoal-edgelord/src/infrastructure/exchange/reconnecting.rs`'s
//! backoff calculation, simplified to just the delay sequence (the engine
//! has no equivalent to that wrapper's circuit breaker).

use rand::Rng;
use std::time::Duration;

/// Backoff policy knobs, `spec.md` §6 "reconnect-base-delay,
/// reconnect-cap-delay, reconnect-jitter-ratio".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub factor: f64,
    /// Upper bound on the delay, regardless of attempt count.
    pub cap: Duration,
    /// Fraction of the delay added as random jitter, e.g. `0.2` for ±20%.
    pub jitter_ratio: f64,
}

impl ReconnectConfig {
    /// `spec.md` §4.4 defaults: 500 ms base, factor 2, 30 s cap, 20% jitter.
    #[must_use]
    pub const fn default_policy() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            cap: Duration::from_secs(30),
            jitter_ratio: 0.2,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::default_policy()
    }
}

/// Tracks the current delay across repeated reconnect attempts.
pub struct Backoff {
    config: ReconnectConfig,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    /// Start a fresh backoff sequence at `config.base_delay`.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self { current: config.base_delay, config, attempt: 0 }
    }

    /// The delay to wait before the next attempt, including jitter, and
    /// advance the sequence for the attempt after that.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        let delay = self.current;
        let scaled = self.current.mul_f64(self.config.factor);
        self.current = scaled.min(self.config.cap);
        Self::with_jitter(delay, self.config.jitter_ratio)
    }

    fn with_jitter(delay: Duration, jitter_ratio: f64) -> Duration {
        if jitter_ratio <= 0.0 {
            return delay;
        }
        let jitter_span = delay.mul_f64(jitter_ratio);
        let offset_ratio = rand::thread_rng().gen_range(-1.0..=1.0);
        let offset = jitter_span.mul_f64(offset_ratio.abs());
        if offset_ratio >= 0.0 { delay + offset } else { delay.saturating_sub(offset) }
    }

    /// Attempts made so far via `next_delay`.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset to the initial delay, e.g. after a connection stays up long
    /// enough to be considered healthy again.
    pub fn reset(&mut self) {
        self.current = self.config.base_delay;
        self.attempt = 0;
    }
}
