pub mod metrics;
mod routes;

pub use metrics::InsightMetrics;
pub use routes::create_router;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use insight_core::{ErrorClass, InsightEngine, InsightError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InsightEngine>,
    pub metrics: Arc<InsightMetrics>,
    /// Deadline applied to every insight request
    pub request_timeout: Duration,
    pub start_time: std::time::Instant,
}

/// JSON response wrapper
#[derive(Serialize)]
pub struct JsonResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Error type for HTTP handlers
pub enum AppError {
    Insight(InsightError),
    Internal(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Insight(e) => match e.class() {
                ErrorClass::Unavailable => StatusCode::BAD_GATEWAY,
                ErrorClass::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
                ErrorClass::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorClass::InvalidInput => StatusCode::BAD_REQUEST,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Upstream detail stays in the logs.
    pub fn message(&self) -> String {
        match self {
            AppError::Insight(e) => match e.class() {
                ErrorClass::Unavailable => "dependency unavailable".to_string(),
                ErrorClass::TooManyRequests => "too many requests".to_string(),
                ErrorClass::Timeout => "request timeout".to_string(),
                ErrorClass::InvalidInput => "invalid customerId".to_string(),
            },
            AppError::Internal(e) => e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(JsonResponse::<()>::err(self.message()))).into_response()
    }
}

impl From<InsightError> for AppError {
    fn from(err: InsightError) -> Self {
        AppError::Insight(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::Dependency;

    #[test]
    fn error_classes_map_to_status_codes() {
        let cases = [
            (
                InsightError::upstream(Dependency::Profile, "reset"),
                StatusCode::BAD_GATEWAY,
                "dependency unavailable",
            ),
            (
                InsightError::CircuitOpen {
                    dependency: Dependency::Transactions,
                },
                StatusCode::BAD_GATEWAY,
                "dependency unavailable",
            ),
            (
                InsightError::BulkheadRejected {
                    dependency: Dependency::Profile,
                },
                StatusCode::TOO_MANY_REQUESTS,
                "too many requests",
            ),
            (
                InsightError::DeadlineExceeded,
                StatusCode::GATEWAY_TIMEOUT,
                "request timeout",
            ),
            (
                InsightError::Cancelled,
                StatusCode::GATEWAY_TIMEOUT,
                "request timeout",
            ),
            (
                InsightError::InvalidCustomerId("x".into()),
                StatusCode::BAD_REQUEST,
                "invalid customerId",
            ),
        ];

        for (err, status, message) in cases {
            let app = AppError::from(err);
            assert_eq!(app.status(), status);
            assert_eq!(app.message(), message);
        }
    }
}
