use clap::Parser;
use insight_core::{
    BulkheadConfig, CircuitBreakerConfig, InsightConfig, ResilienceConfig, RetryPolicy,
};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "insight")]
#[command(about = "Customer insight aggregation server")]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "INSIGHT_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: SocketAddr,

    /// Insight cache TTL in seconds
    #[arg(long, env = "INSIGHT_CACHE_TTL_SECS", default_value = "60")]
    pub cache_ttl_secs: u64,

    /// Per-request deadline in milliseconds
    #[arg(long, env = "INSIGHT_REQUEST_TIMEOUT_MS", default_value = "2000")]
    pub request_timeout_ms: u64,

    /// Consecutive failures that open a dependency's circuit
    #[arg(long, env = "INSIGHT_BREAKER_THRESHOLD", default_value = "5")]
    pub breaker_threshold: u32,

    /// Seconds a tripped circuit stays open
    #[arg(long, env = "INSIGHT_BREAKER_RESET_SECS", default_value = "30")]
    pub breaker_reset_secs: u64,

    /// Concurrent calls admitted per dependency
    #[arg(long, env = "INSIGHT_BULKHEAD_LIMIT", default_value = "10")]
    pub bulkhead_limit: usize,

    /// Attempts per upstream call (1 disables retry)
    #[arg(long, env = "INSIGHT_RETRY_ATTEMPTS", default_value = "3")]
    pub retry_attempts: u32,

    /// First retry backoff in milliseconds, doubled per attempt
    #[arg(long, env = "INSIGHT_RETRY_BASE_MS", default_value = "100")]
    pub retry_base_ms: u64,

    /// Simulated profile service latency in milliseconds
    #[arg(long, env = "INSIGHT_PROFILE_LATENCY_MS", default_value = "150")]
    pub profile_latency_ms: u64,

    /// Simulated transactions service latency in milliseconds
    #[arg(long, env = "INSIGHT_TRANSACTIONS_LATENCY_MS", default_value = "3000")]
    pub transactions_latency_ms: u64,

    /// Expired cache entry sweep interval in seconds (0 disables)
    #[arg(long, env = "INSIGHT_SWEEP_INTERVAL_SECS", default_value = "30")]
    pub sweep_interval_secs: u64,

    /// Grace period for in-flight requests on shutdown, in seconds
    #[arg(long, env = "INSIGHT_SHUTDOWN_TIMEOUT_SECS", default_value = "5")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn profile_latency(&self) -> Duration {
        Duration::from_millis(self.profile_latency_ms)
    }

    pub fn transactions_latency(&self) -> Duration {
        Duration::from_millis(self.transactions_latency_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn resilience_config(&self) -> ResilienceConfig {
        let config = ResilienceConfig::new()
            .with_circuit_breaker(CircuitBreakerConfig::new(
                self.breaker_threshold,
                Duration::from_secs(self.breaker_reset_secs),
            ))
            .with_bulkhead(BulkheadConfig::new(self.bulkhead_limit));

        if self.retry_attempts > 1 {
            config.with_retry(RetryPolicy::new(
                self.retry_attempts,
                Duration::from_millis(self.retry_base_ms),
            ))
        } else {
            config.without_retry()
        }
    }

    pub fn insight_config(&self) -> InsightConfig {
        InsightConfig::default()
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs))
            .with_resilience(self.resilience_config())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_ms == 0 {
            anyhow::bail!("request_timeout_ms must be greater than 0");
        }
        if self.retry_attempts == 0 {
            anyhow::bail!("retry_attempts must be at least 1");
        }
        let errors = self.insight_config().validate();
        if !errors.is_empty() {
            anyhow::bail!("invalid configuration: {}", errors.join("; "));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cache_ttl_secs: 60,
            request_timeout_ms: 2000,
            breaker_threshold: 5,
            breaker_reset_secs: 30,
            bulkhead_limit: 10,
            retry_attempts: 3,
            retry_base_ms: 100,
            profile_latency_ms: 150,
            transactions_latency_ms: 3000,
            sweep_interval_secs: 30,
            shutdown_timeout_secs: 5,
        }
    }
}
