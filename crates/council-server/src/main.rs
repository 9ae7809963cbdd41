use std::net::SocketAddr;
use std::sync::Arc;

use council_core::models::ProviderTag;
use council_core::provider::{AnthropicAdapter, GoogleAdapter, HealthTracker, OpenAiAdapter, ProviderPool, XaiAdapter};
use council_server::config::{provider_credentials, StaticConfigurationProvider};
use council_server::{build_router, AppState, EmptyExampleRepository, EmptySessionProvider, HashingEmbedder, TracingEventSink};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "council_server=debug,council_core=debug,axum=info".to_string()),
        )
        .init();

    let config = StaticConfigurationProvider::from_env()
        .expect("council configuration should load from environment");

    let health = HealthTracker::default();
    let mut pool = ProviderPool::new(health.clone());

    let (openai_base_url, openai_api_key) =
        provider_credentials("OPENAI", "https://api.openai.com/v1");
    pool.register(
        ProviderTag::OpenAi,
        Arc::new(OpenAiAdapter::new(openai_base_url, openai_api_key)),
    );

    let (anthropic_base_url, anthropic_api_key) =
        provider_credentials("ANTHROPIC", "https://api.anthropic.com/v1");
    pool.register(
        ProviderTag::Anthropic,
        Arc::new(AnthropicAdapter::new(anthropic_base_url, anthropic_api_key)),
    );

    let (google_base_url, google_api_key) =
        provider_credentials("GOOGLE", "https://generativelanguage.googleapis.com/v1beta");
    pool.register(
        ProviderTag::Google,
        Arc::new(GoogleAdapter::new(google_base_url, google_api_key)),
    );

    let (xai_base_url, xai_api_key) = provider_credentials("XAI", "https://api.x.ai/v1");
    pool.register(ProviderTag::Xai, Arc::new(XaiAdapter::new(xai_base_url, xai_api_key)));

    let orchestrator = council_core::Orchestrator::new(
        Arc::new(config),
        pool,
        health,
        Arc::new(TracingEventSink),
        Arc::new(HashingEmbedder),
        Arc::new(EmptyExampleRepository),
        Arc::new(EmptySessionProvider),
    );

    let app = build_router(AppState { orchestrator });

    let addr: SocketAddr = std::env::var("COUNCIL_BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8090".to_string())
        .parse()
        .unwrap_or_else(|_| "127.0.0.1:8090".parse().expect("valid default bind addr"));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind should succeed");

    info!("council server listening on {}", listener.local_addr().unwrap_or(addr));
    axum::serve(listener, app).await.expect("server should run");
}
