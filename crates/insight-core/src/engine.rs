//! # Insight Engine
//!
//! Cache-first aggregation over the profile and transactions services. A
//! miss fans out to both dependencies concurrently, each call protected by
//! its own [`DependencyGuard`], and the first failure ends the whole request.

use crate::cache::ExpiringCache;
use crate::context::RequestContext;
use crate::error::{InsightError, Result};
use crate::observer::{InsightObserver, NoopObserver};
use crate::providers::{ProfileProvider, TransactionsProvider};
use crate::resilience::{DependencyGuard, DependencyStatus, ResilienceConfig, MAX_WINDOW};
use crate::types::{
    validate_customer_id, CustomerProfile, Dependency, InsightResult, TransactionsSummary,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info_span, Instrument};

/// Configuration for the insight engine
#[derive(Debug, Clone)]
pub struct InsightConfig {
    pub cache_ttl: Duration,
    pub profile: ResilienceConfig,
    pub transactions: ResilienceConfig,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            profile: ResilienceConfig::default(),
            transactions: ResilienceConfig::default(),
        }
    }
}

impl InsightConfig {
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_profile(mut self, config: ResilienceConfig) -> Self {
        self.profile = config;
        self
    }

    pub fn with_transactions(mut self, config: ResilienceConfig) -> Self {
        self.transactions = config;
        self
    }

    /// Same protection for both dependencies.
    pub fn with_resilience(mut self, config: ResilienceConfig) -> Self {
        self.profile = config.clone();
        self.transactions = config;
        self
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.cache_ttl > MAX_WINDOW {
            errors.push(format!("cache_ttl must be at most {:?}", MAX_WINDOW));
        }
        errors.extend(
            self.profile
                .validate()
                .into_iter()
                .map(|e| format!("profile.{}", e)),
        );
        errors.extend(
            self.transactions
                .validate()
                .into_iter()
                .map(|e| format!("transactions.{}", e)),
        );
        errors
    }
}

/// Customer insight aggregator
pub struct InsightEngine {
    profile: Arc<dyn ProfileProvider>,
    transactions: Arc<dyn TransactionsProvider>,
    profile_guard: Arc<DependencyGuard>,
    transactions_guard: Arc<DependencyGuard>,
    cache: ExpiringCache<InsightResult>,
    observer: Arc<dyn InsightObserver>,
    config: InsightConfig,
}

impl InsightEngine {
    pub fn new(
        profile: Arc<dyn ProfileProvider>,
        transactions: Arc<dyn TransactionsProvider>,
        config: InsightConfig,
    ) -> Self {
        let observer: Arc<dyn InsightObserver> = Arc::new(NoopObserver);
        Self {
            profile,
            transactions,
            profile_guard: Arc::new(DependencyGuard::new(
                Dependency::Profile,
                &config.profile,
                observer.clone(),
            )),
            transactions_guard: Arc::new(DependencyGuard::new(
                Dependency::Transactions,
                &config.transactions,
                observer.clone(),
            )),
            cache: ExpiringCache::new(config.cache_ttl),
            observer,
            config,
        }
    }

    /// Report cache and upstream events to `observer`. Rebuilds the guards,
    /// so call it before the engine serves traffic.
    pub fn with_observer(mut self, observer: Arc<dyn InsightObserver>) -> Self {
        self.profile_guard = Arc::new(DependencyGuard::new(
            Dependency::Profile,
            &self.config.profile,
            observer.clone(),
        ));
        self.transactions_guard = Arc::new(DependencyGuard::new(
            Dependency::Transactions,
            &self.config.transactions,
            observer.clone(),
        ));
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    pub fn cache(&self) -> &ExpiringCache<InsightResult> {
        &self.cache
    }

    /// Generate the insight for a customer, or serve it from cache.
    #[tracing::instrument(name = "generate_insight", skip_all, fields(customer_id = %customer_id))]
    pub async fn generate(&self, ctx: &RequestContext, customer_id: &str) -> Result<InsightResult> {
        validate_customer_id(customer_id)?;

        if let Some(mut hit) = self.cache.get(customer_id) {
            self.observer.cache_hit();
            log::debug!("Insight cache hit for {}", customer_id);
            hit.cached = true;
            return Ok(hit);
        }
        self.observer.cache_miss();

        if let Some(err) = ctx.err() {
            return Err(err);
        }

        // Cancelled on every exit, including this future being dropped, so
        // neither upstream task outlives the request.
        let scope = ctx.child();
        let _scope_guard = CancelOnDrop(scope.clone());
        let profile = self.spawn_profile(&scope, customer_id);
        let transactions = self.spawn_transactions(&scope, customer_id);

        let joined = async {
            tokio::try_join!(
                join(Dependency::Profile, profile),
                join(Dependency::Transactions, transactions)
            )
        };
        let outcome = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            result = joined => result,
        };

        let (profile, summary) = match outcome {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("Insight for {} failed: {}", customer_id, err);
                return Err(err);
            }
        };

        let result = InsightResult::synthesize(customer_id, &profile, &summary);
        self.cache.set(customer_id, result.clone());
        log::info!(
            "Insight generated for {} ({} transactions)",
            customer_id,
            summary.recent_count
        );
        Ok(result)
    }

    /// Drop a cached insight. Returns whether one was present.
    pub fn invalidate(&self, customer_id: &str) -> bool {
        self.cache.invalidate(customer_id)
    }

    pub fn dependency_status(&self) -> Vec<DependencyStatus> {
        vec![self.profile_guard.status(), self.transactions_guard.status()]
    }

    fn spawn_profile(
        &self,
        scope: &RequestContext,
        customer_id: &str,
    ) -> JoinHandle<Result<CustomerProfile>> {
        let guard = self.profile_guard.clone();
        let provider = self.profile.clone();
        let scope = scope.clone();
        let customer_id = customer_id.to_string();
        let span = info_span!("upstream", dependency = %Dependency::Profile);
        tokio::spawn(
            async move {
                guard
                    .call(&scope, || provider.get_profile(&scope, &customer_id))
                    .await
            }
            .instrument(span),
        )
    }

    fn spawn_transactions(
        &self,
        scope: &RequestContext,
        customer_id: &str,
    ) -> JoinHandle<Result<TransactionsSummary>> {
        let guard = self.transactions_guard.clone();
        let provider = self.transactions.clone();
        let scope = scope.clone();
        let customer_id = customer_id.to_string();
        let span = info_span!("upstream", dependency = %Dependency::Transactions);
        tokio::spawn(
            async move {
                guard
                    .call(&scope, || provider.get_summary(&scope, &customer_id))
                    .await
            }
            .instrument(span),
        )
    }
}

struct CancelOnDrop(RequestContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn join<T>(dependency: Dependency, handle: JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(InsightError::upstream(dependency, e)),
    }
}
