use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::RiskEngine;
use crate::observability::MetricsRegistry;

use super::request::EvaluationRequest;
use super::response::{
    ErrorResponse, EvaluationResponse, HealthResponse, ReadyResponse,
};

/// Shared application state.
pub struct AppState {
    pub engine: Arc<RiskEngine>,

    pub metrics: Arc<MetricsRegistry>,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,

    /// Latency budget in milliseconds
    pub latency_budget_ms: u64,
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/risk/evaluate", post(handle_evaluate))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Score a payment.
async fn handle_evaluate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EvaluationRequest>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let correlation_id = Uuid::new_v4();

    let Json(req) = match body {
        Ok(req) => req,
        Err(rejection) => {
            warn!(correlation_id = %correlation_id, error = %rejection, "Malformed evaluation request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request(correlation_id)),
            )
                .into_response();
        }
    };

    let ctx = match req.into_context() {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(correlation_id = %correlation_id, error = %e, "Invalid evaluation request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request(correlation_id)),
            )
                .into_response();
        }
    };

    // Engine errors are logged with the correlation id inside the engine
    let outcome = match state.engine.evaluate(&ctx, correlation_id).await {
        Ok(outcome) => outcome,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::server_error(correlation_id)),
            )
                .into_response();
        }
    };

    let elapsed = start.elapsed();
    if elapsed.as_millis() > state.latency_budget_ms as u128 {
        warn!(
            correlation_id = %correlation_id,
            user_id = %ctx.user_id,
            latency_ms = elapsed.as_millis() as u64,
            budget_ms = state.latency_budget_ms,
            "Evaluation latency exceeded budget"
        );
    }

    info!(
        correlation_id = %correlation_id,
        user_id = %ctx.user_id,
        action = %outcome.result.action,
        latency_ms = elapsed.as_millis() as u64,
        "Evaluation completed"
    );

    (StatusCode::OK, Json(EvaluationResponse::from(outcome))).into_response()
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint. Not ready while rules cannot be listed.
async fn handle_ready(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.ready().await {
        Ok(active_rules) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                active_rules,
            }),
        )
            .into_response(),
        Err(e) => {
            let correlation_id = Uuid::new_v4();
            warn!(correlation_id = %correlation_id, error = %e, "Rule store not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::not_ready(correlation_id)),
            )
                .into_response()
        }
    }
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = format!(
        "{}\n# HELP txrisk_uptime_seconds Application uptime in seconds\n# TYPE txrisk_uptime_seconds counter\ntxrisk_uptime_seconds {}\n",
        state.metrics.to_prometheus(),
        state.start_time.elapsed().as_secs(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        body,
    )
}
