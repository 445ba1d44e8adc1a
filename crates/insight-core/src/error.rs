use crate::types::Dependency;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InsightError>;

/// Boxed error carried by an upstream failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("Upstream {dependency} failed: {source}")]
    Upstream {
        dependency: Dependency,
        #[source]
        source: BoxError,
    },

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Cancelled")]
    Cancelled,

    #[error("Circuit breaker is open for {dependency}")]
    CircuitOpen { dependency: Dependency },

    #[error("Bulkhead full for {dependency}")]
    BulkheadRejected { dependency: Dependency },

    #[error("Invalid customer id: {0:?}")]
    InvalidCustomerId(String),
}

/// Coarse grouping of error kinds, used by adapters to pick a response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The dependency failed or is being shed by its breaker.
    Unavailable,
    /// The dependency is at its concurrency cap.
    TooManyRequests,
    /// The caller's deadline elapsed or the caller gave up.
    Timeout,
    InvalidInput,
}

impl InsightError {
    /// Wrap an error returned by an upstream dependency.
    pub fn upstream<E>(dependency: Dependency, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        InsightError::Upstream {
            dependency,
            source: source.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            InsightError::Upstream { .. } | InsightError::CircuitOpen { .. } => {
                ErrorClass::Unavailable
            }
            InsightError::BulkheadRejected { .. } => ErrorClass::TooManyRequests,
            InsightError::DeadlineExceeded | InsightError::Cancelled => ErrorClass::Timeout,
            InsightError::InvalidCustomerId(_) => ErrorClass::InvalidInput,
        }
    }

    /// True for the two context-driven outcomes.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, InsightError::DeadlineExceeded | InsightError::Cancelled)
    }

    /// Dependency this error is attributed to, if any.
    pub fn dependency(&self) -> Option<Dependency> {
        match self {
            InsightError::Upstream { dependency, .. }
            | InsightError::CircuitOpen { dependency }
            | InsightError::BulkheadRejected { dependency } => Some(*dependency),
            _ => None,
        }
    }
}
