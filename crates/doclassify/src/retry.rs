//! Exponential backoff shared by the LLM call and the storage writer.

use std::time::Duration;

use log::{debug, warn};

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_multiplier: backoff_multiplier.max(1.0),
        }
    }

    /// Storage writes: 3 attempts, delay doubling from 200ms.
    pub fn storage() -> Self {
        Self::new(3, Duration::from_millis(200), 2.0)
    }

    /// Sleep before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(MAX_BACKOFF.as_secs_f64()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are spent. `op` receives the 1-based attempt number.
/// Retries are strictly sequential: the backoff sleep completes before the
/// next attempt starts.
pub fn retry_with_policy<T, E, F, R>(policy: &RetryPolicy, is_retryable: R, op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    retry_with_delay_hint(policy, is_retryable, |_| None, op)
}

/// Like [`retry_with_policy`], but an error may ask for a longer wait (a
/// server's `Retry-After`). The hint raises the backoff, never lowers it,
/// and is still capped at [`MAX_BACKOFF`].
pub fn retry_with_delay_hint<T, E, F, R, H>(
    policy: &RetryPolicy,
    is_retryable: R,
    delay_hint: H,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
    H: Fn(&E) -> Option<Duration>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                let mut delay = policy.delay_after(attempt);
                if let Some(hint) = delay_hint(&e) {
                    delay = delay.max(hint.min(MAX_BACKOFF));
                }
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, policy.max_attempts, e, delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                debug!("Giving up after attempt {}: {}", attempt, e);
                return Err(e);
            }
        }
    }
}
