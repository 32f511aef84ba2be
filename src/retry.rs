//! Bounded exponential backoff for transient collaborator failures.
//!
//! One policy type serves every call site (query submit/poll/fetch and mail
//! delivery); each call site passes its own [`BackoffPolicy`] from config.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;

/// Classifies an error as worth retrying.
pub trait Transient {
    fn is_transient(&self) -> bool;

    /// Server-provided hint for the next attempt (e.g. a throttling response).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Retry/backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Max attempts per operation (including the first try).
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Jitter percentage applied to each delay (0.0..=1.0).
    pub jitter_pct: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter_pct: 0.2,
        }
    }
}

impl BackoffPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(explicit) = retry_after {
            return explicit.min(self.max_delay());
        }
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exp);
        let raw_ms = (self.base_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        let capped = Duration::from_millis(raw_ms.max(0.0) as u64);
        apply_jitter(capped, self.jitter_pct).min(self.max_delay())
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was not transient; no further attempts were made.
    Fatal { error: E, attempts: u32 },
    /// Every attempt failed with a transient error.
    Exhausted { error: E, attempts: u32 },
    /// The next backoff sleep would have crossed the deadline.
    Deadline { error: E, attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Deadline { attempts, .. } => *attempts,
        }
    }

    pub fn into_error(self) -> E {
        match self {
            Self::Fatal { error, .. } | Self::Exhausted { error, .. } | Self::Deadline { error, .. } => {
                error
            }
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal { error, .. } => write!(f, "{error}"),
            Self::Exhausted { error, attempts } => {
                write!(f, "gave up after {attempts} attempts: {error}")
            }
            Self::Deadline { error, attempts } => {
                write!(f, "deadline reached after {attempts} attempts: {error}")
            }
        }
    }
}

/// Run `op` until it succeeds, fails fatally, runs out of attempts, or the
/// next backoff would end at or past `deadline`.
///
/// `op` receives the 1-based attempt number.
pub fn retry<T, E, F>(
    policy: &BackoffPolicy,
    clock: &dyn Clock,
    deadline: Instant,
    operation: &str,
    op: F,
) -> Result<T, RetryError<E>>
where
    E: Transient + fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    retry_with_floor(policy, clock, deadline, operation, Duration::ZERO, op)
}

/// Like [`retry`], but no backoff sleep is shorter than `floor`, whatever the
/// policy, jitter or a retry-after hint says.
pub fn retry_with_floor<T, E, F>(
    policy: &BackoffPolicy,
    clock: &dyn Clock,
    deadline: Instant,
    operation: &str,
    floor: Duration,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Transient + fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match op(attempts) {
            Ok(value) => {
                if attempts > 1 {
                    debug!(operation, attempts, "Operation recovered after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !error.is_transient() {
                    return Err(RetryError::Fatal { error, attempts });
                }
                if attempts >= max_attempts {
                    warn!(
                        operation,
                        attempts,
                        error = %error,
                        "Transient failure; attempts exhausted"
                    );
                    return Err(RetryError::Exhausted { error, attempts });
                }
                let delay = policy.delay_for_attempt(attempts, error.retry_after()).max(floor);
                if clock.now() + delay >= deadline {
                    warn!(
                        operation,
                        attempts,
                        backoff_ms = delay.as_millis() as u64,
                        "Backoff would cross the invocation deadline"
                    );
                    return Err(RetryError::Deadline { error, attempts });
                }
                debug!(
                    operation,
                    attempt = attempts,
                    max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure; backing off"
                );
                clock.sleep(delay);
            }
        }
    }
}

fn apply_jitter(duration: Duration, jitter_pct: f64) -> Duration {
    if jitter_pct <= 0.0 {
        return duration;
    }
    let unit = next_jitter_unit();
    let delta = (unit * 2.0 - 1.0) * jitter_pct.min(1.0);
    let base_ms = duration.as_millis() as f64;
    let jittered = (base_ms * (1.0 + delta)).max(1.0);
    Duration::from_millis(jittered.round() as u64)
}

fn next_jitter_unit() -> f64 {
    static SEED: AtomicU64 = AtomicU64::new(0x9e37_79b9_7f4a_7c15);
    let mut current = SEED.load(Ordering::Relaxed);
    loop {
        let next = current.wrapping_mul(6364136223846793005u64).wrapping_add(1);
        match SEED.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => {
                // Top 53 bits give a uniform f64 in [0, 1).
                let value = next >> 11;
                return (value as f64) / ((1u64 << 53) as f64);
            }
            Err(actual) => current = actual,
        }
    }
}
