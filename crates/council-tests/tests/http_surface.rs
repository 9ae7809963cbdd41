//! Drives `council_server::build_router` end to end with `tower::oneshot`
//! against a real `Router`, no bound TCP listener needed.

mod support;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use council_core::collaborators::{CouncilConfig, DeliberationConfig, PerformanceConfig};
use council_core::models::ProviderTag;
use council_core::provider::{HealthTracker, ProviderPool};
use council_core::synthesis::SynthesisConfig;
use council_core::Orchestrator;
use council_server::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

use support::{member, ok, FixedConfig, OneHotEmbedder, RecordingEventSink, ScriptedAdapter};

fn app_state() -> (AppState, Arc<ScriptedAdapter>, HealthTracker) {
    let health = HealthTracker::default();
    let mut pool = ProviderPool::new(health.clone());
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.push("a", ok("4", 50, 10));
    adapter.push("a", ok("The answer is 4.", 80, 20));
    pool.register(ProviderTag::OpenAi, adapter.clone());

    let config = FixedConfig {
        council: CouncilConfig {
            members: vec![member("a", ProviderTag::OpenAi)],
            require_minimum_for_consensus: true,
            minimum_size: 1,
        },
        deliberation: DeliberationConfig { rounds: 0 },
        synthesis: SynthesisConfig::consensus_extraction(),
        performance: PerformanceConfig {
            global_timeout_seconds: 5,
            enable_fast_fallback: true,
            streaming_enabled: false,
        },
    };

    let orchestrator = Orchestrator::new(
        Arc::new(config),
        pool,
        health.clone(),
        Arc::new(RecordingEventSink::default()),
        Arc::new(OneHotEmbedder::default()),
        Arc::new(support::EmptyExamples),
        Arc::new(support::EmptySessions),
    );

    (AppState { orchestrator }, adapter, health)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
    serde_json::from_slice(&bytes).expect("body should be json")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (state, _adapter, _health) = app_state();
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn query_endpoint_returns_a_consensus_decision() {
    let (state, _adapter, _health) = app_state();
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/council/query")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "query": "What is 2+2?" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["consensus_decision"]["content"].as_str().unwrap().contains('4'));
    assert!(body["metrics"]["member_metrics"]["a"].is_object());
}

#[tokio::test]
async fn query_endpoint_rejects_an_empty_query() {
    let (state, _adapter, _health) = app_state();
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/council/query")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "query": "   " }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_query");
}

#[tokio::test]
async fn disable_then_enable_provider_round_trips_through_health_tracker() {
    let (state, _adapter, health) = app_state();
    let app = build_router(state);

    let disable_request = Request::builder()
        .method("POST")
        .uri("/v1/council/providers/a/disable")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "reason": "maintenance" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(disable_request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(health.is_disabled("a"));

    let health_request = Request::builder().uri("/v1/council/health").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(health_request).await.expect("router should respond");
    let body = body_json(response).await;
    let entries = body.as_array().expect("health response should be an array");
    assert!(entries.iter().any(|entry| entry["provider_id"] == "a" && entry["status"] == "disabled"));

    let enable_request = Request::builder()
        .method("POST")
        .uri("/v1/council/providers/a/enable")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(enable_request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!health.is_disabled("a"));
}
