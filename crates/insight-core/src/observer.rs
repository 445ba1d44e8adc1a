//! Hooks for metrics. The engine reports cache and upstream events here and
//! never depends on a concrete metrics backend.

use crate::error::{InsightError, Result};
use crate::types::Dependency;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a guarded upstream call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamOutcome {
    Success,
    Failure,
    Timeout,
    Cancelled,
}

impl UpstreamOutcome {
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(InsightError::DeadlineExceeded) => Self::Timeout,
            Err(InsightError::Cancelled) => Self::Cancelled,
            Err(_) => Self::Failure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

pub trait InsightObserver: Send + Sync {
    fn cache_hit(&self) {}
    fn cache_miss(&self) {}
    fn upstream_completed(&self, _dependency: Dependency, _outcome: UpstreamOutcome, _elapsed: Duration) {}
    fn circuit_rejected(&self, _dependency: Dependency) {}
    fn bulkhead_rejected(&self, _dependency: Dependency) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl InsightObserver for NoopObserver {}
