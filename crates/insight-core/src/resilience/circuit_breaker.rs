//! # Circuit Breaker
//!
//! Consecutive-failure breaker. `threshold` failures since the last success
//! open the circuit for exactly `reset_timeout`; while open every call is
//! refused without reaching the dependency. Once the window elapses calls are
//! allowed again with no half-open trial budget. Failures are never decayed by time:
//! a closed circuit is cleared only by [`CircuitBreaker::record_success`],
//! and after an elapsed open window the tally restarts from zero, so
//! reopening takes `threshold` fresh failures.

use crate::context::deadline_after;
use crate::error::{InsightError, Result};
use crate::resilience::CircuitBreakerConfig;
use crate::types::Dependency;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Observable circuit states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls are allowed through
    Closed,
    /// Calls are refused until the open window elapses
    Open,
}

#[derive(Debug, Default)]
struct BreakerState {
    failures: u32,
    open_until: Option<Instant>,
}

impl BreakerState {
    fn is_open(&self, now: Instant) -> bool {
        self.open_until.is_some_and(|until| now < until)
    }

    /// The open window has passed; the next failure starts a fresh tally.
    fn window_elapsed(&self, now: Instant) -> bool {
        self.open_until.is_some_and(|until| now >= until)
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    dependency: Dependency,
    threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(dependency: Dependency, config: CircuitBreakerConfig) -> Self {
        log::info!(
            "Circuit breaker for {} initialized (threshold {}, reset {:?})",
            dependency,
            config.failure_threshold,
            config.reset_timeout
        );
        Self {
            dependency,
            threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    /// Refuse while the open window is active. Read-only.
    pub fn allow(&self) -> Result<()> {
        if self.lock().is_open(Instant::now()) {
            Err(InsightError::CircuitOpen {
                dependency: self.dependency,
            })
        } else {
            Ok(())
        }
    }

    /// Close the circuit and clear the failure tally.
    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.failures > 0 || state.open_until.is_some() {
            log::debug!(
                "Circuit breaker for {} reset after {} failures",
                self.dependency,
                state.failures
            );
        }
        state.failures = 0;
        state.open_until = None;
    }

    /// Count a failure; opens the circuit when the tally reaches the threshold.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.lock();
        if state.window_elapsed(now) {
            state.failures = 0;
            state.open_until = None;
        }
        state.failures = state.failures.saturating_add(1);
        if state.failures >= self.threshold {
            state.open_until = Some(deadline_after(now, self.reset_timeout));
            log::warn!(
                "Circuit breaker for {} opened after {} consecutive failures ({:?})",
                self.dependency,
                state.failures,
                self.reset_timeout
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        if self.lock().is_open(Instant::now()) {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Failures counting toward the next trip. Zero once an open window has
    /// elapsed, since the next failure restarts the tally.
    pub fn failure_count(&self) -> u32 {
        let state = self.lock();
        if state.window_elapsed(Instant::now()) {
            0
        } else {
            state.failures
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            Dependency::Transactions,
            CircuitBreakerConfig::new(threshold, reset),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn trips_at_threshold_and_success_resets() {
        let cb = breaker(3, Duration::from_secs(30));

        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow().is_ok());

        cb.record_failure();
        assert!(matches!(
            cb.allow(),
            Err(InsightError::CircuitOpen {
                dependency: Dependency::Transactions
            })
        ));
        assert_eq!(cb.state(), CircuitState::Open);

        cb.record_success();
        assert!(cb.allow().is_ok());
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_for_exactly_reset_timeout() {
        let cb = breaker(1, Duration::from_secs(10));
        cb.record_failure();

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(cb.allow().is_err());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.allow().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn allow_does_not_change_state() {
        let cb = breaker(2, Duration::from_secs(10));
        cb.record_failure();
        for _ in 0..5 {
            assert!(cb.allow().is_ok());
        }
        assert_eq!(cb.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_after_the_window_counts_from_zero() {
        let cb = breaker(3, Duration::from_secs(5));
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cb.allow().is_ok());

        cb.record_failure();
        assert!(cb.allow().is_ok());
        assert_eq!(cb.failure_count(), 1);

        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_count_is_zero_once_the_window_elapses() {
        let cb = breaker(3, Duration::from_secs(5));
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.failure_count(), 3);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_reset_window_stays_open() {
        let cb = breaker(1, Duration::from_secs(u64::MAX));
        cb.record_failure();

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow().is_err());

        cb.record_success();
        assert!(cb.allow().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_one_reopens_on_a_single_failure() {
        let cb = breaker(1, Duration::from_secs(5));
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cb.allow().is_ok());

        cb.record_failure();
        assert!(cb.allow().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_without_success_accumulate_while_closed() {
        let cb = breaker(3, Duration::from_secs(5));
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(3600)).await;
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(3600)).await;
        cb.record_failure();
        assert!(cb.allow().is_err());
    }

    proptest! {
        #[test]
        fn opens_iff_failures_reach_threshold(threshold in 1u32..10, failures in 0u32..20) {
            let cb = breaker(threshold, Duration::from_secs(3600));
            for _ in 0..failures {
                cb.record_failure();
            }
            prop_assert_eq!(cb.allow().is_err(), failures >= threshold);
        }
    }
}
