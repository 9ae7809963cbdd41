//! `council-core` — the provider pool and adapter layer, similarity
//! service, synthesis engine (including iterative consensus negotiation),
//! and orchestration engine that together make up the AI Council Proxy's
//! core, independent of any HTTP surface, persistence engine, or
//! configuration backend (those are external collaborators, injected as
//! traits). See SPEC_FULL.md for how this crate fits into the wider
//! workspace.

pub mod collaborators;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod similarity;
pub mod synthesis;

pub use collaborators::{
    ConfigurationProvider, ConfigurationSnapshot, CouncilConfig, DeliberationConfig, Embedder,
    EventSink, ExampleRepository, NegotiationExample, PerformanceConfig, SessionProvider,
};
pub use errors::{CoreError, ProviderError};
pub use orchestrator::Orchestrator;
pub use provider::{HealthTracker, HealthTrackerConfig, ProviderAdapter, ProviderPool};
pub use synthesis::{FallbackStrategy, IterativeConsensusConfig, ModeratorStrategy, SynthesisConfig};
