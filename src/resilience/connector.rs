// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry executor with running resilience statistics.
//!
//! [`ResilientConnector`] runs any fallible async operation under a
//! [`RetryConfig`], sleeping with exponential backoff plus jitter between
//! attempts. Only the calling task sleeps; other operations sharing the
//! connector keep running.
//!
//! The connector also keeps counters that describe how the backend has
//! been behaving: retries, consecutive failures, a moving average of
//! recovery time and a bounded history of recent failures.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::retry::RetryConfig;
use crate::storage::traits::{CacheError, CacheResult};

/// Failure history capacity.
pub const FAILURE_HISTORY_CAPACITY: usize = 50;

/// Weight of the newest sample in the recovery-time moving average.
const RECOVERY_EMA_ALPHA: f64 = 0.2;

/// One failed attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub label: String,
    pub attempt: usize,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Point-in-time copy of the connector counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResilienceStats {
    /// Retries scheduled after a failed attempt.
    pub total_retries: u64,
    /// Operations that succeeded after at least one failure.
    pub successful_retries: u64,
    /// Operations that exhausted every attempt.
    pub failed_retries: u64,
    pub consecutive_failures: u64,
    /// Moving average of first-failure-to-success time, in milliseconds.
    pub avg_recovery_time_ms: f64,
    pub last_failure: Option<FailureRecord>,
    pub failure_history: Vec<FailureRecord>,
    pub reconnecting: bool,
}

#[derive(Debug, Default)]
struct ResilienceState {
    total_retries: u64,
    successful_retries: u64,
    failed_retries: u64,
    consecutive_failures: u64,
    avg_recovery_time_ms: f64,
    failure_history: VecDeque<FailureRecord>,
}

impl ResilienceState {
    fn record_failure(&mut self, record: FailureRecord) {
        self.consecutive_failures += 1;
        if self.failure_history.len() >= FAILURE_HISTORY_CAPACITY {
            self.failure_history.pop_front();
        }
        self.failure_history.push_back(record);
    }

    fn record_recovery(&mut self, recovery: Duration) {
        let sample = recovery.as_secs_f64() * 1000.0;
        self.avg_recovery_time_ms = if self.successful_retries == 0 {
            sample
        } else {
            RECOVERY_EMA_ALPHA * sample + (1.0 - RECOVERY_EMA_ALPHA) * self.avg_recovery_time_ms
        };
        self.successful_retries += 1;
    }
}

/// Clears the reentrancy flag when a reconnection finishes or is cancelled.
struct ReconnectGuard<'a>(&'a AtomicBool);

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ResilientConnector {
    config: RetryConfig,
    state: Mutex<ResilienceState>,
    reconnecting: AtomicBool,
}

impl ResilientConnector {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ResilienceState::default()),
            reconnecting: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    pub async fn execute_with_retry<F, Fut, T, E>(&self, label: &str, operation: F) -> CacheResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_with_retry_observed(label, operation, |_, _| {}).await
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry), calling
    /// `on_attempt_failure(attempt, &error)` after every failed attempt.
    ///
    /// After exhaustion the last error is returned as
    /// [`CacheError::Connection`] carrying `label` and the attempt count.
    pub async fn execute_with_retry_observed<F, Fut, T, E, C>(
        &self,
        label: &str,
        mut operation: F,
        mut on_attempt_failure: C,
    ) -> CacheResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: FnMut(usize, &E),
    {
        let mut attempt = 0usize;
        let mut first_failure: Option<Instant> = None;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    let mut state = self.state.lock();
                    state.consecutive_failures = 0;
                    if let Some(started) = first_failure {
                        state.record_recovery(started.elapsed());
                        info!(label, attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    first_failure.get_or_insert_with(Instant::now);
                    on_attempt_failure(attempt, &err);
                    self.state.lock().record_failure(FailureRecord {
                        label: label.to_string(),
                        attempt,
                        error: err.to_string(),
                        at: Utc::now(),
                    });

                    if !self.config.allows_another(attempt) {
                        self.state.lock().failed_retries += 1;
                        error!(label, attempts = attempt, error = %err, "Retries exhausted");
                        return Err(CacheError::Connection {
                            label: label.to_string(),
                            attempts: attempt,
                            message: err.to_string(),
                        });
                    }

                    let delay = self.config.delay_for_attempt(attempt);
                    self.state.lock().total_retries += 1;
                    match self.config.max_attempts {
                        Some(max) => warn!(
                            label, attempt, max_attempts = max, error = %err, ?delay,
                            "Operation failed, retrying"
                        ),
                        None => warn!(
                            label, attempt, error = %err, ?delay,
                            "Operation failed, will retry forever"
                        ),
                    }
                    sleep(delay).await;
                }
            }
        }
    }

    /// Run a reconnection sequence unless one is already in flight.
    ///
    /// Returns `Ok(None)` immediately when another task holds the
    /// reconnection slot, so concurrent callers never race duplicate
    /// retry loops against the backend.
    pub async fn attempt_reconnection<F, Fut, T, E>(&self, operation: F) -> CacheResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Reconnection already in progress");
            return Ok(None);
        }
        let _guard = ReconnectGuard(&self.reconnecting);

        let value = self.execute_with_retry("reconnect", operation).await?;
        info!("Reconnection succeeded");
        Ok(Some(value))
    }

    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> ResilienceStats {
        let state = self.state.lock();
        ResilienceStats {
            total_retries: state.total_retries,
            successful_retries: state.successful_retries,
            failed_retries: state.failed_retries,
            consecutive_failures: state.consecutive_failures,
            avg_recovery_time_ms: state.avg_recovery_time_ms,
            last_failure: state.failure_history.back().cloned(),
            failure_history: state.failure_history.iter().cloned().collect(),
            reconnecting: self.is_reconnecting(),
        }
    }

    pub fn reset_stats(&self) {
        *self.state.lock() = ResilienceState::default();
    }
}

impl Default for ResilientConnector {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    fn fast(max_attempts: usize) -> ResilientConnector {
        ResilientConnector::new(RetryConfig::test().with_max_attempts(max_attempts))
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let connector = fast(3);
        let result: CacheResult<i32> = connector
            .execute_with_retry("op", || async { Ok::<_, TestError>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        let stats = connector.stats();
        assert_eq!(stats.total_retries, 0);
        assert_eq!(stats.successful_retries, 0);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let connector = fast(5);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = connector
            .execute_with_retry("op", || {
                let a = counter.clone();
                async move {
                    let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(TestError(format!("fail {}", count)))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let stats = connector.stats();
        assert_eq!(stats.total_retries, 2);
        assert_eq!(stats.successful_retries, 1);
        assert_eq!(stats.failed_retries, 0);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.failure_history.len(), 2);
        assert!(stats.avg_recovery_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let connector = fast(3);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result: CacheResult<i32> = connector
            .execute_with_retry("redis_connect", || {
                let a = counter.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("always fail".to_string()))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            CacheError::Connection { label, attempts, message } => {
                assert_eq!(label, "redis_connect");
                assert_eq!(attempts, 3);
                assert!(message.contains("always fail"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let stats = connector.stats();
        assert_eq!(stats.failed_retries, 1);
        assert_eq!(stats.consecutive_failures, 3);
        assert_eq!(stats.last_failure.unwrap().attempt, 3);
    }

    #[tokio::test]
    async fn test_observer_sees_every_failure() {
        let connector = fast(4);
        let mut seen = Vec::new();

        let _: CacheResult<()> = connector
            .execute_with_retry_observed(
                "op",
                || async { Err::<(), _>(TestError("nope".into())) },
                |attempt, err: &TestError| seen.push((attempt, err.0.clone())),
            )
            .await;

        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[3].0, 4);
    }

    #[tokio::test]
    async fn test_failure_history_is_bounded() {
        let connector = fast(FAILURE_HISTORY_CAPACITY + 20);

        let _: CacheResult<()> = connector
            .execute_with_retry("op", || async { Err::<(), _>(TestError("x".into())) })
            .await;

        let stats = connector.stats();
        assert_eq!(stats.failure_history.len(), FAILURE_HISTORY_CAPACITY);
        // Oldest evicted first
        assert_eq!(stats.failure_history[0].attempt, 21);
    }

    #[tokio::test]
    async fn test_concurrent_reconnection_runs_once() {
        let connector = Arc::new(fast(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let run = |connector: Arc<ResilientConnector>, calls: Arc<AtomicUsize>| async move {
            connector
                .attempt_reconnection(|| {
                    let calls = calls.clone();
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        if n < 2 {
                            Err(TestError("down".into()))
                        } else {
                            Ok("connected")
                        }
                    }
                })
                .await
        };

        let (a, b) = tokio::join!(
            run(connector.clone(), calls.clone()),
            run(connector.clone(), calls.clone())
        );

        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(outcomes.iter().filter(|o| o.is_some()).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| o.is_none()).count(), 1);
        // One sequence: one failure then one success
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!connector.is_reconnecting());
    }

    #[tokio::test]
    async fn test_reconnection_flag_cleared_after_failure() {
        let connector = fast(2);

        let result: CacheResult<Option<()>> = connector
            .attempt_reconnection(|| async { Err::<(), _>(TestError("down".into())) })
            .await;
        assert!(result.is_err());
        assert!(!connector.is_reconnecting());

        let again = connector
            .attempt_reconnection(|| async { Ok::<_, TestError>(7) })
            .await
            .unwrap();
        assert_eq!(again, Some(7));
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let connector = fast(2);
        let _: CacheResult<()> = connector
            .execute_with_retry("op", || async { Err::<(), _>(TestError("x".into())) })
            .await;
        connector.reset_stats();
        assert_eq!(connector.stats(), ResilienceStats::default());
    }
}
