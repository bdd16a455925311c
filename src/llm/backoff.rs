//! Explicit retry with exponential backoff.
//!
//! Wraps a single fallible call: attempt, wait `base * multiplier^n` (capped),
//! attempt again, and hand back the last error once the attempts run out.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Longest single wait a config may ask for, in seconds.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Retry policy for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Tries per model, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait before the second try, in seconds.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,
    /// Growth factor between consecutive waits.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Upper bound for any single wait, in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_secs() -> f64 {
    4.0
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_secs() -> f64 {
    10.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            multiplier: default_multiplier(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// The failure returned once every attempt has been used.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Exponential backoff runner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 { multiplier } else { 1.0 },
            max_delay,
        }
    }

    /// Retry without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0, Duration::ZERO)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            secs(config.base_delay_secs),
            config.multiplier,
            secs(config.max_delay_secs),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait inserted after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
            .unwrap_or(self.max_delay)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn retry<T, E, F>(&self, op: F) -> Result<T, RetryExhausted<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        self.retry_with_sleep(op, std::thread::sleep)
    }

    /// Like [`retry`](Self::retry), but an error for which `retryable`
    /// returns false ends the run at once, without waiting.
    pub fn retry_if<T, E, F, P>(&self, op: F, retryable: P) -> Result<T, RetryExhausted<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        self.run(op, retryable, std::thread::sleep)
    }

    /// [`retry`](Self::retry) with an injectable sleep.
    pub fn retry_with_sleep<T, E, F, S>(&self, op: F, sleep: S) -> Result<T, RetryExhausted<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
        S: FnMut(Duration),
    {
        self.run(op, |_: &E| true, sleep)
    }

    fn run<T, E, F, P, S>(&self, mut op: F, retryable: P, mut sleep: S) -> Result<T, RetryExhausted<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
        S: FnMut(Duration),
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts || !retryable(&e) => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "attempt failed, backing off");
                    if !delay.is_zero() {
                        sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Seconds to a `Duration`: non-positive or NaN is zero, too large saturates.
fn secs(value: f64) -> Duration {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}
