use crate::context::RequestContext;
use crate::error::{InsightError, Result};
use crate::observer::{InsightObserver, UpstreamOutcome};
use crate::resilience::{Bulkhead, CircuitBreaker, CircuitState, ResilienceConfig, RetryPolicy};
use crate::types::Dependency;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

/// Point-in-time view of one dependency's protection layers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyStatus {
    pub dependency: Dependency,
    pub circuit: Option<CircuitState>,
    pub consecutive_failures: u32,
    pub in_flight: usize,
    pub max_concurrent: Option<usize>,
}

/// Breaker → bulkhead → retry around every call to one dependency.
///
/// The breaker is consulted first so an open circuit never costs a bulkhead
/// slot. The permit is held for the whole retried call and dropped wherever
/// the call ends. The breaker sees one outcome per logical call, after
/// retries are exhausted.
pub struct DependencyGuard {
    dependency: Dependency,
    breaker: Option<CircuitBreaker>,
    bulkhead: Option<Bulkhead>,
    retry: Option<RetryPolicy>,
    observer: Arc<dyn InsightObserver>,
}

impl DependencyGuard {
    pub fn new(
        dependency: Dependency,
        config: &ResilienceConfig,
        observer: Arc<dyn InsightObserver>,
    ) -> Self {
        Self {
            dependency,
            breaker: config
                .circuit_breaker
                .clone()
                .map(|c| CircuitBreaker::new(dependency, c)),
            bulkhead: config
                .bulkhead
                .as_ref()
                .map(|c| Bulkhead::new(dependency, c.max_concurrent)),
            retry: config.retry.clone(),
            observer,
        }
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    pub fn bulkhead(&self) -> Option<&Bulkhead> {
        self.bulkhead.as_ref()
    }

    pub async fn call<T, F, Fut>(&self, ctx: &RequestContext, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(breaker) = &self.breaker {
            if let Err(e) = breaker.allow() {
                self.observer.circuit_rejected(self.dependency);
                return Err(e);
            }
        }

        let _permit = match &self.bulkhead {
            Some(bulkhead) => match bulkhead.try_acquire() {
                Some(permit) => Some(permit),
                None => {
                    self.observer.bulkhead_rejected(self.dependency);
                    return Err(InsightError::BulkheadRejected {
                        dependency: self.dependency,
                    });
                }
            },
            None => None,
        };

        let start = Instant::now();
        let result = match &self.retry {
            Some(policy) => policy.execute(ctx, || ctx.run(operation())).await,
            None => ctx.run(operation()).await,
        };
        let elapsed = start.elapsed();

        let outcome = UpstreamOutcome::of(&result);
        if let Some(breaker) = &self.breaker {
            match outcome {
                UpstreamOutcome::Success => breaker.record_success(),
                UpstreamOutcome::Failure | UpstreamOutcome::Timeout => breaker.record_failure(),
                UpstreamOutcome::Cancelled => {}
            }
        }
        self.observer
            .upstream_completed(self.dependency, outcome, elapsed);

        if let Err(e) = &result {
            log::debug!("{} call failed after {:?}: {}", self.dependency, elapsed, e);
        }
        result
    }

    pub fn status(&self) -> DependencyStatus {
        DependencyStatus {
            dependency: self.dependency,
            circuit: self.breaker.as_ref().map(|b| b.state()),
            consecutive_failures: self.breaker.as_ref().map_or(0, |b| b.failure_count()),
            in_flight: self.bulkhead.as_ref().map_or(0, |b| b.in_flight()),
            max_concurrent: self.bulkhead.as_ref().map(|b| b.limit()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::resilience::{BulkheadConfig, CircuitBreakerConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn guard(config: ResilienceConfig) -> DependencyGuard {
        DependencyGuard::new(Dependency::Profile, &config, Arc::new(NoopObserver))
    }

    fn failing() -> futures::future::Ready<Result<()>> {
        futures::future::ready(Err(InsightError::upstream(Dependency::Profile, "503")))
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_refuses_without_calling() {
        let g = guard(
            ResilienceConfig::unguarded()
                .with_circuit_breaker(CircuitBreakerConfig::new(2, Duration::from_secs(30))),
        );
        let ctx = RequestContext::background();

        for _ in 0..2 {
            assert!(g.call(&ctx, failing).await.is_err());
        }

        let calls = AtomicU32::new(0);
        let result = g
            .call(&ctx, || {
                calls.fetch_add(1, Ordering::SeqCst);
                futures::future::ready(Ok(()))
            })
            .await;

        assert!(matches!(result, Err(InsightError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_counts_logical_calls_not_attempts() {
        let g = guard(
            ResilienceConfig::unguarded()
                .with_circuit_breaker(CircuitBreakerConfig::new(3, Duration::from_secs(30)))
                .with_retry(RetryPolicy::new(3, Duration::from_millis(10))),
        );
        let ctx = RequestContext::background();

        assert!(g.call(&ctx, failing).await.is_err());

        let breaker = g.breaker().unwrap();
        assert_eq!(breaker.failure_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn full_bulkhead_refuses_and_slot_returns_after_call() {
        let g = Arc::new(guard(
            ResilienceConfig::unguarded().with_bulkhead(BulkheadConfig::new(1)),
        ));
        let ctx = RequestContext::background();

        let slow = {
            let g = g.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                g.call(&ctx, || async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(g.status().in_flight, 1);

        let rejected = g.call(&ctx, || futures::future::ready(Ok(()))).await;
        assert!(matches!(rejected, Err(InsightError::BulkheadRejected { .. })));

        slow.await.unwrap().unwrap();
        assert_eq!(g.status().in_flight, 0);
        assert!(g.call(&ctx, || futures::future::ready(Ok(()))).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_counts_as_failure_cancel_does_not() {
        let g = guard(
            ResilienceConfig::unguarded()
                .with_circuit_breaker(CircuitBreakerConfig::new(5, Duration::from_secs(30))),
        );

        let timed = RequestContext::with_timeout(Duration::from_millis(50));
        let result = g
            .call(&timed, || async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(InsightError::DeadlineExceeded)));
        assert_eq!(g.breaker().unwrap().failure_count(), 1);

        let cancelled = RequestContext::background();
        cancelled.cancel();
        let result = g.call(&cancelled, || futures::future::ready(Ok(()))).await;
        assert!(matches!(result, Err(InsightError::Cancelled)));
        assert_eq!(g.breaker().unwrap().failure_count(), 1);
    }

    #[tokio::test]
    async fn success_resets_failures() {
        let g = guard(ResilienceConfig::default().without_retry());
        let ctx = RequestContext::background();

        assert!(g.call(&ctx, failing).await.is_err());
        assert_eq!(g.status().consecutive_failures, 1);

        g.call(&ctx, || futures::future::ready(Ok(()))).await.unwrap();
        let status = g.status();
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.circuit, Some(CircuitState::Closed));
        assert_eq!(status.max_concurrent, Some(10));
    }
}
