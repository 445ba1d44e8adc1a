pub mod cache;
pub mod context;
pub mod engine;
pub mod error;
pub mod observer;
pub mod providers;
pub mod resilience;
pub mod types;

pub use cache::{CacheEntry, ExpiringCache};
pub use context::RequestContext;
pub use engine::{InsightConfig, InsightEngine};
pub use error::{ErrorClass, InsightError, Result};
pub use observer::{InsightObserver, NoopObserver, UpstreamOutcome};
pub use providers::{
    ProfileProvider, SimulatedProfileProvider, SimulatedTransactionsProvider, TransactionsProvider,
};
pub use resilience::{
    Bulkhead, BulkheadConfig, BulkheadPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    DependencyGuard, DependencyStatus, ResilienceConfig, RetryPolicy, MAX_WINDOW,
};
pub use types::*;
