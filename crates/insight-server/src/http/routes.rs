use super::{AppError, AppResult, AppState, JsonResponse};
use axum::{
    extract::{MatchedPath, Path, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use insight_core::{DependencyStatus, ErrorClass, InsightResult, RequestContext};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

static REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/insights/:customer_id", get(get_insight))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_http))
        .with_state(state)
}

/// Count and time every routed request.
async fn track_http(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    state
        .metrics
        .observe_http(&route, &method, response.status().as_u16(), start.elapsed());
    response
}

// ── Insights ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsightResponse {
    customer_id: String,
    insight: String,
    generated_at: DateTime<Utc>,
    meta: InsightMeta,
}

#[derive(Serialize)]
struct InsightMeta {
    cached: bool,
}

impl From<InsightResult> for InsightResponse {
    fn from(result: InsightResult) -> Self {
        Self {
            customer_id: result.customer_id,
            insight: result.insight,
            generated_at: result.generated_at,
            meta: InsightMeta {
                cached: result.cached,
            },
        }
    }
}

/// Caller-supplied request id, or a fresh one.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string())
}

/// GET /v1/insights/:customer_id
async fn get_insight(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    let request_id = request_id(&headers);
    let ctx = RequestContext::with_timeout(state.request_timeout);
    let span = info_span!("insight_request", request_id = %request_id, customer_id = %customer_id);

    let outcome = state
        .engine
        .generate(&ctx, &customer_id)
        .instrument(span)
        .await;
    let mut response = match outcome {
        Ok(result) => {
            info!(
                customer_id = %customer_id,
                request_id = %request_id,
                cached = result.cached,
                latency_ms = start.elapsed().as_millis() as u64,
                "insight generated"
            );
            Json(JsonResponse::ok(InsightResponse::from(result))).into_response()
        }
        Err(e) => {
            let latency_ms = start.elapsed().as_millis() as u64;
            let err = AppError::from(e);
            let status = err.status().as_u16();
            match &err {
                AppError::Insight(inner) if inner.class() == ErrorClass::InvalidInput => {
                    warn!(customer_id = %customer_id, request_id = %request_id, "invalid customerId");
                }
                AppError::Insight(inner) => {
                    error!(
                        customer_id = %customer_id,
                        request_id = %request_id,
                        error = %inner,
                        status,
                        latency_ms,
                        "insight request failed"
                    );
                }
                AppError::Internal(inner) => {
                    error!(request_id = %request_id, error = %inner, status, "insight request failed");
                }
            }
            err.into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID.clone(), value);
    }
    response
}

// ── Health ─────────────────────────────────────────────────────────────────────

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    uptime_secs: u64,
    cache_entries: usize,
    dependencies: Vec<DependencyStatus>,
}

/// GET /readyz. Always 200 while serving; reports per-dependency protection state.
async fn readyz(State(state): State<AppState>) -> Json<JsonResponse<ReadyResponse>> {
    Json(JsonResponse::ok(ReadyResponse {
        status: "ready",
        uptime_secs: state.start_time.elapsed().as_secs(),
        cache_entries: state.engine.cache().len(),
        dependencies: state.engine.dependency_status(),
    }))
}

/// GET /metrics (Prometheus text exposition)
async fn metrics(State(state): State<AppState>) -> AppResult<Response> {
    state.metrics.update_gauges(
        &state.engine.dependency_status(),
        state.engine.cache().len(),
        state.start_time.elapsed(),
    );
    let body = state
        .metrics
        .encode()
        .map_err(|e| anyhow::anyhow!("metrics encoding failed: {}", e))?;

    Ok((
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
        .into_response())
}
