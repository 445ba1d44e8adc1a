//! Per-dependency fault isolation: circuit breaker, bulkhead and retry,
//! composed by [`DependencyGuard`].

pub mod bulkhead;
pub mod circuit_breaker;
pub mod config;
pub mod guard;
pub mod retry;

pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::{BulkheadConfig, CircuitBreakerConfig, ResilienceConfig, RetryPolicy, MAX_WINDOW};
pub use guard::{DependencyGuard, DependencyStatus};
