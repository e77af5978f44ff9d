// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff with jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use murmur_config::model::RetryConfig;
use murmur_core::MurmurError;

/// Attempt count and delay bounds for [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (attempts are 1-based), with ±25% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay).as_millis() as u64;
        Duration::from_millis(apply_jitter(capped))
    }
}

fn apply_jitter(base_ms: u64) -> u64 {
    let range = base_ms / 4;
    if range == 0 {
        return base_ms;
    }
    let offset = rand::thread_rng().gen_range(0..=2 * range);
    base_ms - range + offset
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. The last error is returned.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, MurmurError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MurmurError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
        }
    }

    #[test]
    fn delays_grow_and_are_capped() {
        let p = policy();
        for _ in 0..50 {
            let first = p.delay_for(1).as_millis();
            assert!((75..=125).contains(&first), "first delay {first}");
            let third = p.delay_for(3).as_millis();
            assert!((188..=313).contains(&third), "capped delay {third}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_up_to_limit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&policy(), "append", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MurmurError::storage("database is locked")) }
        })
        .await;
        assert!(matches!(result, Err(MurmurError::Storage { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&policy(), "append", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(MurmurError::storage("busy"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&policy(), "append", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MurmurError::not_found("session", "gone")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
