//! Reference collaborator implementations and HTTP wiring for the AI
//! Council Proxy binary. None of this is part of the specified core
//! (see SPEC_FULL.md §3) — `council-tests` links against it only to drive
//! the orchestrator through a real `axum` router in integration tests.

pub mod config;
pub mod embedder;
pub mod event_sink;
pub mod example_repository;
pub mod http;
pub mod session_provider;

pub use config::{ConfigError, StaticConfigurationProvider};
pub use embedder::HashingEmbedder;
pub use event_sink::TracingEventSink;
pub use example_repository::EmptyExampleRepository;
pub use http::{build_router, AppState};
pub use session_provider::EmptySessionProvider;
