use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Longest reset window or cache TTL accepted by validation (one year).
pub const MAX_WINDOW: Duration = Duration::from_secs(86_400 * 365);

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (since the last success) that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open once tripped.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }
        if self.reset_timeout.is_zero() {
            return Err("reset_timeout must be greater than 0".to_string());
        }
        if self.reset_timeout > MAX_WINDOW {
            return Err(format!("reset_timeout must be at most {:?}", MAX_WINDOW));
        }
        Ok(())
    }
}

/// Configuration for a concurrency bulkhead
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkheadConfig {
    /// Maximum concurrently admitted calls.
    pub max_concurrent: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

impl BulkheadConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".to_string());
        }
        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(format!(
                "max_concurrent must be at most {}",
                Semaphore::MAX_PERMITS
            ));
        }
        Ok(())
    }
}

/// Retry policy: attempt count and the first backoff interval, doubled
/// after every failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
        }
    }

    /// Backoff slept after the given 1-based failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base_backoff.saturating_mul(1u32 << shift)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Protection applied to one upstream dependency. Each layer is optional;
/// a `None` layer is skipped entirely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResilienceConfig {
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub bulkhead: Option<BulkheadConfig>,
    pub retry: Option<RetryPolicy>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: Some(CircuitBreakerConfig::default()),
            bulkhead: Some(BulkheadConfig::default()),
            retry: Some(RetryPolicy::default()),
        }
    }
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No breaker, no bulkhead, no retry: calls go straight through.
    pub fn unguarded() -> Self {
        Self {
            circuit_breaker: None,
            bulkhead: None,
            retry: None,
        }
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn with_bulkhead(mut self, config: BulkheadConfig) -> Self {
        self.bulkhead = Some(config);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    /// Validate every configured layer, collecting all problems.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(Err(e)) = self.circuit_breaker.as_ref().map(|c| c.validate()) {
            errors.push(format!("circuit_breaker: {}", e));
        }
        if let Some(Err(e)) = self.bulkhead.as_ref().map(|c| c.validate()) {
            errors.push(format!("bulkhead: {}", e));
        }
        if let Some(Err(e)) = self.retry.as_ref().map(|c| c.validate()) {
            errors.push(format!("retry: {}", e));
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(800));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.backoff_for(40), Duration::MAX);
    }

    #[test]
    fn validation_collects_every_layer() {
        let config = ResilienceConfig::new()
            .with_circuit_breaker(CircuitBreakerConfig::new(0, Duration::from_secs(1)))
            .with_bulkhead(BulkheadConfig::new(0))
            .with_retry(RetryPolicy::new(0, Duration::from_millis(10)));

        let errors = config.validate();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("circuit_breaker"));
    }

    #[test]
    fn out_of_range_windows_and_limits_are_rejected() {
        let config = ResilienceConfig::new()
            .with_circuit_breaker(CircuitBreakerConfig::new(1, Duration::from_secs(u64::MAX)))
            .with_bulkhead(BulkheadConfig::new(usize::MAX));

        let errors = config.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("reset_timeout must be at most"), "{:?}", errors);
        assert!(errors[1].contains("max_concurrent must be at most"), "{:?}", errors);

        let at_limit = ResilienceConfig::new()
            .with_circuit_breaker(CircuitBreakerConfig::new(1, MAX_WINDOW))
            .with_bulkhead(BulkheadConfig::new(Semaphore::MAX_PERMITS));
        assert!(at_limit.validate().is_empty());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(ResilienceConfig::default().validate().is_empty());
        assert!(ResilienceConfig::unguarded().validate().is_empty());
    }
}
