// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Bounded polling for conditions that depend on distributed, eventually
//! consistent state.
//!
//! Every wait in the harness goes through [`wait_until`], so interval and
//! deadline policy lives in exactly one place. An operation is re-invoked
//! from scratch on every attempt; it must either be idempotent or fetch
//! fresh state each time it runs.

use std::{fmt::Display, future::Future, pin::Pin, time::Duration};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval and deadline for a polled wait.
#[derive(Clone, Copy, Debug)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// The deadline passed before the awaited condition held.
///
/// Carries the human readable description of the condition and the last
/// failure observed from the wrapped operation.
#[derive(Debug, Error)]
#[error(
    "gave up waiting for {description} after {attempts} attempts over {elapsed:?} \
     (deadline {timeout:?}); last failure: {last_failure}"
)]
pub struct TimeoutError {
    pub description: String,
    pub timeout: Duration,
    pub elapsed: Duration,
    pub attempts: usize,
    pub last_failure: String,
}

/// Polls `operation` with the default policy until it succeeds or the
/// deadline passes.
pub async fn wait_until<'a, T, E, O>(description: &str, operation: O) -> Result<T, TimeoutError>
where
    E: Display,
    O: FnMut() -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>,
{
    wait_until_with(PollPolicy::default(), description, operation).await
}

/// Polls `operation` at a fixed interval until it succeeds, returning its
/// value, or until the deadline passes, returning a [`TimeoutError`] that
/// embeds `description` and the last observed failure.
pub async fn wait_until_with<'a, T, E, O>(
    policy: PollPolicy,
    description: &str,
    mut operation: O,
) -> Result<T, TimeoutError>
where
    E: Display,
    O: FnMut() -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>,
{
    let start = Instant::now();
    let mut attempts = 0usize;
    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let elapsed = start.elapsed();
                if elapsed + policy.interval >= policy.timeout {
                    return Err(TimeoutError {
                        description: description.to_string(),
                        timeout: policy.timeout,
                        elapsed,
                        attempts,
                        last_failure: err.to_string(),
                    });
                }
                debug!(
                    "waiting for {}: attempt {} failed ({}), retrying in {:?}",
                    description, attempts, err, policy.interval
                );
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(10), Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_the_condition_holds() {
        let mut remaining_failures = 3u32;
        let mut attempts = 0u32;
        let result = wait_until_with(fast(), "the counter to drain", || {
            attempts += 1;
            let outcome = if remaining_failures == 0 {
                Ok(attempts)
            } else {
                remaining_failures -= 1;
                Err("not yet")
            };
            Box::pin(async move { outcome })
        })
        .await
        .unwrap();
        // Three failures then a success on the fourth attempt.
        assert_eq!(result, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_a_timeout_when_the_condition_never_holds() {
        let policy = fast();
        let err = wait_until_with(policy, "a condition that never holds", || {
            Box::pin(async { Err::<(), _>("still broken") })
        })
        .await
        .unwrap_err();

        let max_attempts = (policy.timeout.as_millis() / policy.interval.as_millis()) as usize + 1;
        assert!(err.attempts <= max_attempts, "took {} attempts", err.attempts);
        assert!(err.elapsed < policy.timeout);
        assert!(err.elapsed + policy.interval >= policy.timeout);
        assert!(err.to_string().contains("a condition that never holds"));
        assert!(err.to_string().contains("still broken"));
    }

    #[tokio::test(start_paused = true)]
    async fn success_abandons_remaining_attempts() {
        let mut attempts = 0u32;
        wait_until("an immediate success", || {
            attempts += 1;
            Box::pin(async { Ok::<_, String>(()) })
        })
        .await
        .unwrap();
        assert_eq!(attempts, 1);
    }
}
