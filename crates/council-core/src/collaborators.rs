//! External interfaces consumed by the core. The core only depends on these
//! traits — how they're implemented (database-backed config, a real event
//! log, a hosted embedding model) is entirely outside this crate's scope.
//! `council-server` supplies minimal reference implementations.

use std::future::Future;
use std::pin::Pin;

use crate::models::{
    ConsensusDecision, CouncilMember, DeliberationRound, InitialResponse,
    IterativeConsensusMetadata, NegotiationResponse, RequestMetrics,
};
use crate::synthesis::SynthesisConfig;

#[derive(Debug, Clone)]
pub struct CouncilConfig {
    pub members: Vec<CouncilMember>,
    pub require_minimum_for_consensus: bool,
    pub minimum_size: usize,
}

#[derive(Debug, Clone)]
pub struct DeliberationConfig {
    pub rounds: u32,
}

#[derive(Debug, Clone)]
pub struct PerformanceConfig {
    pub global_timeout_seconds: u64,
    pub enable_fast_fallback: bool,
    pub streaming_enabled: bool,
}

/// A point-in-time capture of every config collaborator, taken once at
/// request start and used for the entire request lifetime — config changes
/// mid-request never affect a request already in flight.
#[derive(Debug, Clone)]
pub struct ConfigurationSnapshot {
    pub council: CouncilConfig,
    pub deliberation: DeliberationConfig,
    pub synthesis: SynthesisConfig,
    pub performance: PerformanceConfig,
}

pub trait ConfigurationProvider: Send + Sync {
    fn council_config(&self) -> CouncilConfig;
    fn deliberation_config(&self) -> DeliberationConfig;
    fn synthesis_config(&self) -> SynthesisConfig;
    fn performance_config(&self) -> PerformanceConfig;

    fn snapshot(&self) -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            council: self.council_config(),
            deliberation: self.deliberation_config(),
            synthesis: self.synthesis_config(),
            performance: self.performance_config(),
        }
    }
}

/// Fire-and-forget persistence sink. Every method must be safe to call
/// concurrently; failures never propagate back to the core — implementations
/// swallow their own errors and log locally.
pub trait EventSink: Send + Sync {
    fn log_request(&self, request_id: uuid::Uuid, query: &str);
    fn log_council_response(&self, request_id: uuid::Uuid, response: &InitialResponse);
    fn log_deliberation_round(&self, request_id: uuid::Uuid, round: &DeliberationRound);
    fn log_consensus_decision(&self, request_id: uuid::Uuid, decision: &ConsensusDecision);
    fn log_cost(&self, request_id: uuid::Uuid, metrics: &RequestMetrics);
    fn log_provider_failure(&self, provider_id: &str, error: &str);
    fn log_negotiation_round(&self, request_id: uuid::Uuid, round_number: u32, responses: &[NegotiationResponse]);
    fn log_negotiation_response(&self, request_id: uuid::Uuid, response: &NegotiationResponse);
    fn log_consensus_metadata(&self, request_id: uuid::Uuid, metadata: &IterativeConsensusMetadata);
}

pub type EmbeddingFuture<'a> = Pin<Box<dyn Future<Output = Vec<f32>> + Send + 'a>>;

/// Pure-function embedding contract. The core never hard-codes an embedding
/// model; this is injected by the caller.
pub trait Embedder: Send + Sync {
    fn embed<'a>(&'a self, text: &'a str) -> EmbeddingFuture<'a>;
    fn model_id(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct NegotiationExample {
    pub query: String,
    pub resolution: String,
}

pub trait ExampleRepository: Send + Sync {
    fn relevant<'a>(
        &'a self,
        query: &'a str,
        k: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<NegotiationExample>> + Send + 'a>>;
}

pub trait SessionProvider: Send + Sync {
    fn context_for<'a>(
        &'a self,
        session_id: &'a str,
        token_budget: u32,
    ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>>;
}
