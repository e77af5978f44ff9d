// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-dependency circuit breaker.
//!
//! State machine: closed -> open after `failure_threshold` consecutive
//! failures; open -> half-open once `open_timeout` has elapsed, admitting a
//! single trial call; half-open -> closed on trial success, back to open on
//! trial failure.
//!
//! Every guarded call runs on its own task under the call timeout, so the
//! success/failure accounting is applied even when the caller stops waiting.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use murmur_config::model::BreakerConfig;
use murmur_core::MurmurError;
use murmur_core::error::CIRCUIT_OPEN;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn gauge_value(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

/// Thresholds and timeouts for one breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub call_timeout: Duration,
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            open_timeout: config.open_timeout(),
            call_timeout: config.call_timeout(),
        }
    }
}

/// Point-in-time view of a breaker for the status surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub dependency: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

/// Whether a call was admitted normally or as the half-open trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Trial,
}

/// A circuit breaker guarding one named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let name = name.into();
        metrics::gauge!("murmur_breaker_state", "dependency" => name.clone())
            .set(CircuitState::Closed.gauge_value());
        Self {
            name,
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                opened_at_wall: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// True if a call made now would be rejected without being attempted.
    pub fn is_open(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen => inner.trial_in_flight,
            CircuitState::Open => !self.open_timeout_elapsed(&inner),
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            dependency: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at_wall,
        }
    }

    /// Run `fut` through the breaker.
    ///
    /// Rejected calls fail immediately with `DependencyUnavailable` and never
    /// poll `fut`. Dependency failures and timeouts are normalized to
    /// `DependencyUnavailable` / `DependencyTimeout`; errors that mean the
    /// dependency answered (not found, validation, parse) pass through and
    /// count as success.
    pub async fn call<T, Fut>(self: &Arc<Self>, fut: Fut) -> Result<T, MurmurError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, MurmurError>> + Send + 'static,
    {
        let permit = self.acquire()?;
        let breaker = Arc::clone(self);
        let call_timeout = self.settings.call_timeout;

        let task = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(call_timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(MurmurError::DependencyTimeout {
                    dependency: breaker.name.clone(),
                    duration: call_timeout,
                }),
            };
            let failed = matches!(&outcome, Err(e) if counts_as_failure(e));
            breaker.record(permit, !failed);
            outcome.map_err(|e| breaker.normalize(e))
        });

        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                self.record(permit, false);
                Err(MurmurError::DependencyUnavailable {
                    dependency: self.name.clone(),
                    message: format!("call aborted: {join_err}"),
                })
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open_timeout_elapsed(&self, inner: &Inner) -> bool {
        inner
            .opened_at
            .is_none_or(|at| at.elapsed() >= self.settings.open_timeout)
    }

    fn acquire(&self) -> Result<Permit, MurmurError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::Normal),
            CircuitState::Open if self.open_timeout_elapsed(&inner) => {
                inner.trial_in_flight = true;
                self.transition(&mut inner, CircuitState::HalfOpen);
                Ok(Permit::Trial)
            }
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                Ok(Permit::Trial)
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                metrics::counter!("murmur_breaker_rejections_total", "dependency" => self.name.clone())
                    .increment(1);
                debug!(dependency = %self.name, "circuit open, call rejected");
                Err(MurmurError::DependencyUnavailable {
                    dependency: self.name.clone(),
                    message: CIRCUIT_OPEN.to_string(),
                })
            }
        }
    }

    fn record(&self, permit: Permit, success: bool) {
        let mut inner = self.lock();
        if success {
            match permit {
                Permit::Trial => {
                    inner.trial_in_flight = false;
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                    inner.opened_at_wall = None;
                    self.transition(&mut inner, CircuitState::Closed);
                }
                Permit::Normal if inner.state == CircuitState::Closed => {
                    inner.consecutive_failures = 0;
                }
                // A straggler finishing after the circuit opened changes nothing.
                Permit::Normal => {}
            }
            return;
        }

        metrics::counter!("murmur_breaker_failures_total", "dependency" => self.name.clone())
            .increment(1);
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match permit {
            Permit::Trial => {
                inner.trial_in_flight = false;
                self.open(&mut inner);
            }
            Permit::Normal
                if inner.state == CircuitState::Closed
                    && inner.consecutive_failures >= self.settings.failure_threshold =>
            {
                self.open(&mut inner);
            }
            Permit::Normal => {}
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.opened_at = Some(Instant::now());
        inner.opened_at_wall = Some(Utc::now());
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        metrics::gauge!("murmur_breaker_state", "dependency" => self.name.clone())
            .set(to.gauge_value());
        match to {
            CircuitState::Open => warn!(
                dependency = %self.name,
                %from,
                consecutive_failures = inner.consecutive_failures,
                open_timeout_secs = self.settings.open_timeout.as_secs(),
                "circuit opened"
            ),
            _ => info!(dependency = %self.name, %from, %to, "circuit state changed"),
        }
    }

    fn normalize(&self, err: MurmurError) -> MurmurError {
        match err {
            MurmurError::Provider { message, .. } | MurmurError::Internal(message) => {
                MurmurError::DependencyUnavailable {
                    dependency: self.name.clone(),
                    message,
                }
            }
            MurmurError::Storage { source } => MurmurError::DependencyUnavailable {
                dependency: self.name.clone(),
                message: source.to_string(),
            },
            other => other,
        }
    }
}

/// Errors that indicate the dependency itself misbehaved.
fn counts_as_failure(err: &MurmurError) -> bool {
    matches!(
        err,
        MurmurError::Provider { .. }
            | MurmurError::Storage { .. }
            | MurmurError::Internal(_)
            | MurmurError::DependencyTimeout { .. }
            | MurmurError::DependencyUnavailable { .. }
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "llm_embed",
            BreakerSettings {
                failure_threshold: threshold,
                open_timeout: Duration::from_secs(60),
                call_timeout: Duration::from_secs(1),
            },
        ))
    }

    fn provider_err() -> MurmurError {
        MurmurError::Provider {
            message: "HTTP 503".into(),
            source: None,
        }
    }

    async fn fail(b: &Arc<CircuitBreaker>) -> MurmurError {
        b.call(async { Err::<(), _>(provider_err()) })
            .await
            .unwrap_err()
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_skips_underlying_call() {
        let b = breaker(5);
        for _ in 0..5 {
            let err = fail(&b).await;
            assert!(matches!(err, MurmurError::DependencyUnavailable { ref message, .. } if message == "HTTP 503"));
        }
        assert_eq!(b.state(), CircuitState::Open);

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let err = b
            .call(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MurmurError::DependencyUnavailable { ref message, .. } if message == CIRCUIT_OPEN));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let b = breaker(3);
        fail(&b).await;
        fail(&b).await;
        assert_eq!(b.consecutive_failures(), 2);
        b.call(async { Ok(()) }).await.unwrap();
        assert_eq!(b.consecutive_failures(), 0);
        fail(&b).await;
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let b = breaker(1);
        let err = b
            .call(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MurmurError::DependencyTimeout { .. }));
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_exactly_one_trial() {
        let b = breaker(1);
        fail(&b).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!b.is_open());

        let (release, hold) = tokio::sync::oneshot::channel::<()>();
        let trial_breaker = Arc::clone(&b);
        let trial = tokio::spawn(async move {
            trial_breaker
                .call(async move {
                    let _ = hold.await;
                    Ok(7)
                })
                .await
        });
        while b.state() != CircuitState::HalfOpen {
            tokio::task::yield_now().await;
        }

        let rejected = b.call(async { Ok(0) }).await.unwrap_err();
        assert!(matches!(rejected, MurmurError::DependencyUnavailable { .. }));

        release.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), 7);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens() {
        let b = breaker(2);
        fail(&b).await;
        fail(&b).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.is_open());

        // opened_at was reset by the failed trial.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(b.is_open());
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!b.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_passes_through_without_counting() {
        let b = breaker(1);
        let err = b
            .call(async { Err::<(), _>(MurmurError::not_found("session", "s1")) })
            .await
            .unwrap_err();
        assert!(matches!(err, MurmurError::NotFound { .. }));
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn accounting_survives_caller_cancellation() {
        let b = breaker(1);
        let call = b.call(async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Err::<(), _>(provider_err())
        });
        // The caller gives up long before the dependency answers.
        let _ = tokio::time::timeout(Duration::from_millis(10), call).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_open_exactly_once() {
        let b = breaker(5);
        let mut handles = Vec::new();
        for _ in 0..20 {
            let b = Arc::clone(&b);
            handles.push(tokio::spawn(async move {
                let _ = b.call(async { Err::<(), _>(provider_err()) }).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.consecutive_failures() >= 5);
    }
}
