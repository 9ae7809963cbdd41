//! HTTP surface wiring `Orchestrator` behind `axum` — the gateway layer the
//! core itself stays deliberately ignorant of. One router-builder function,
//! one JSON error body shape reused across every handler.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use council_core::models::{ProviderHealth, UserRequest};
use council_core::{CoreError, Orchestrator};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/council/query", post(process_query))
        .route("/v1/council/health", get(provider_health))
        .route("/v1/council/providers/{provider_id}/enable", post(enable_provider))
        .route("/v1/council/providers/{provider_id}/disable", post(disable_provider))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    session_id: Option<String>,
    context: Option<String>,
    preset: Option<String>,
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

async fn process_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Response {
    let trimmed = req.query.trim();
    if trimmed.is_empty() {
        return bad_request_response("invalid_query", "query must not be empty");
    }

    let mut request = UserRequest::new(trimmed.to_string());
    request.session_id = req.session_id;
    request.context = req.context;
    request.preset = req.preset;

    match state.orchestrator.process_request(&request).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => core_error_response(err),
    }
}

async fn provider_health(State(state): State<AppState>) -> impl IntoResponse {
    let health: Vec<ProviderHealth> = state.orchestrator.provider_health();
    (StatusCode::OK, Json(health))
}

async fn enable_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> impl IntoResponse {
    state.orchestrator.enable_provider(&provider_id);
    (StatusCode::OK, Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
struct DisableProviderRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn disable_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    body: Option<Json<DisableProviderRequest>>,
) -> impl IntoResponse {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .unwrap_or_else(|| "disabled via admin API".to_string());
    state.orchestrator.disable_provider(&provider_id, reason);
    (StatusCode::OK, Json(OkResponse { ok: true }))
}

fn bad_request_response(code: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

fn core_error_response(err: CoreError) -> Response {
    let status = match &err {
        CoreError::ProviderNotConfigured { .. }
        | CoreError::ProviderDisabled { .. }
        | CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CoreError::InsufficientMembers { .. } | CoreError::GlobalDeadlineExceeded { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CoreError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        CoreError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
        CoreError::AuthenticationError(_) => StatusCode::BAD_GATEWAY,
        CoreError::ServiceUnavailable(_) | CoreError::NetworkError(_) => StatusCode::BAD_GATEWAY,
        CoreError::SynthesisFailed(_) | CoreError::UnknownError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %err, "processRequest failed with an internal error");
    }
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: format!("{:?}", err.kind()),
                message: err.to_string(),
            },
        }),
    )
        .into_response()
}
