use crate::error::{InsightError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted customer id length.
pub const MAX_CUSTOMER_ID_LEN: usize = 64;

/// Minimum accepted customer id length.
pub const MIN_CUSTOMER_ID_LEN: usize = 3;

/// The two upstream services an insight is built from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Profile,
    Transactions,
}

impl Dependency {
    pub const ALL: [Dependency; 2] = [Dependency::Profile, Dependency::Transactions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Profile => "profile",
            Dependency::Transactions => "transactions",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer profile as returned by the profile service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerProfile {
    pub id: String,
    /// Display name used in the synthesized insight.
    pub name: String,
    pub preference: String,
}

/// Recent activity as returned by the transactions service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionsSummary {
    pub recent_count: u32,
    pub total_amount: Decimal,
}

/// A synthesized insight for one customer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightResult {
    pub customer_id: String,
    pub insight: String,
    pub generated_at: DateTime<Utc>,
    /// Whether this copy was served from cache. Never set on the stored value.
    pub cached: bool,
}

impl InsightResult {
    /// Build a fresh (uncached) result from both upstream responses.
    pub fn synthesize(
        customer_id: &str,
        profile: &CustomerProfile,
        summary: &TransactionsSummary,
    ) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            insight: format!(
                "{} made {} transactions recently, totaling {:.2}.",
                profile.name, summary.recent_count, summary.total_amount
            ),
            generated_at: Utc::now(),
            cached: false,
        }
    }
}

/// Check a customer id: 3–64 characters of `[A-Za-z0-9_-]`.
pub fn validate_customer_id(customer_id: &str) -> Result<()> {
    let len_ok = (MIN_CUSTOMER_ID_LEN..=MAX_CUSTOMER_ID_LEN).contains(&customer_id.len());
    let chars_ok = customer_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if len_ok && chars_ok {
        Ok(())
    } else {
        Err(InsightError::InvalidCustomerId(customer_id.to_string()))
    }
}
