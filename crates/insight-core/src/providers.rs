//! Upstream collaborators and their in-process simulations.

use crate::context::RequestContext;
use crate::error::Result;
use crate::types::{CustomerProfile, TransactionsSummary};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

/// Source of customer profiles
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn get_profile(&self, ctx: &RequestContext, customer_id: &str) -> Result<CustomerProfile>;
}

/// Source of recent transaction activity
#[async_trait]
pub trait TransactionsProvider: Send + Sync {
    async fn get_summary(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
    ) -> Result<TransactionsSummary>;
}

/// Profile service stand-in: fixed data after a fixed delay.
#[derive(Debug, Clone)]
pub struct SimulatedProfileProvider {
    pub latency: Duration,
    pub name: String,
    pub preference: String,
}

impl Default for SimulatedProfileProvider {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(150),
            name: "Cliente Exemplo".to_string(),
            preference: "digital".to_string(),
        }
    }
}

impl SimulatedProfileProvider {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ProfileProvider for SimulatedProfileProvider {
    async fn get_profile(&self, ctx: &RequestContext, customer_id: &str) -> Result<CustomerProfile> {
        ctx.sleep(self.latency).await?;
        Ok(CustomerProfile {
            id: customer_id.to_string(),
            name: self.name.clone(),
            preference: self.preference.clone(),
        })
    }
}

/// Transactions service stand-in: fixed data after a fixed delay.
#[derive(Debug, Clone)]
pub struct SimulatedTransactionsProvider {
    pub latency: Duration,
    pub recent_count: u32,
    pub total_amount: Decimal,
}

impl Default for SimulatedTransactionsProvider {
    fn default() -> Self {
        Self {
            latency: Duration::from_secs(3),
            recent_count: 5,
            total_amount: Decimal::new(123456, 2),
        }
    }
}

impl SimulatedTransactionsProvider {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TransactionsProvider for SimulatedTransactionsProvider {
    async fn get_summary(
        &self,
        ctx: &RequestContext,
        _customer_id: &str,
    ) -> Result<TransactionsSummary> {
        ctx.sleep(self.latency).await?;
        Ok(TransactionsSummary {
            recent_count: self.recent_count,
            total_amount: self.total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InsightError;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn profile_returns_fixed_data_after_latency() {
        let provider = SimulatedProfileProvider::default();
        let ctx = RequestContext::background();
        let start = Instant::now();

        let profile = provider.get_profile(&ctx, "abc123").await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(150));
        assert_eq!(profile.id, "abc123");
        assert_eq!(profile.name, "Cliente Exemplo");
        assert_eq!(profile.preference, "digital");
    }

    #[tokio::test(start_paused = true)]
    async fn transactions_stop_at_the_deadline() {
        let provider = SimulatedTransactionsProvider::default();
        let ctx = RequestContext::with_timeout(Duration::from_secs(2));
        let start = Instant::now();

        let result = provider.get_summary(&ctx, "abc123").await;

        assert!(matches!(result, Err(InsightError::DeadlineExceeded)));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn transactions_defaults() {
        let provider = SimulatedTransactionsProvider::new(Duration::from_millis(10));
        let summary = provider
            .get_summary(&RequestContext::background(), "abc123")
            .await
            .unwrap();
        assert_eq!(summary.recent_count, 5);
        assert_eq!(summary.total_amount.to_string(), "1234.56");
    }
}
