//! Shared test doubles for `council-tests`: a small collection of fakes
//! assembled per test rather than one monolithic mock framework.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use council_core::collaborators::{
    ConfigurationProvider, CouncilConfig, DeliberationConfig, EmbeddingFuture, Embedder, EventSink,
    ExampleRepository, NegotiationExample, PerformanceConfig, SessionProvider,
};
use council_core::errors::ProviderError;
use council_core::models::{
    ConsensusDecision, CouncilMember, DeliberationRound, ErrorKind, InitialResponse,
    IterativeConsensusMetadata, NegotiationResponse, RequestMetrics, RetryPolicy, TokenUsage,
};
use council_core::provider::{AdapterFuture, ProviderAdapter, ProviderHealthProbe, ProviderResponse};
use council_core::synthesis::SynthesisConfig;

/// An adapter whose response queue is fixed at construction time, keyed per
/// member id so a single pool can host several differently-behaved stub
/// members at once.
pub struct ScriptedAdapter {
    scripts: Mutex<HashMap<String, VecDeque<Result<ProviderResponse, ProviderError>>>>,
    delays: Mutex<HashMap<String, Duration>>,
    call_counts: Mutex<HashMap<String, u32>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            call_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&self, member_id: &str, outcome: Result<ProviderResponse, ProviderError>) {
        self.scripts
            .lock()
            .expect("lock")
            .entry(member_id.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn always(&self, member_id: &str, outcome: impl Fn() -> Result<ProviderResponse, ProviderError> + 'static) {
        // Fill with a generous number of repeats; tests here never run more
        // than a handful of rounds.
        for _ in 0..64 {
            self.push(member_id, outcome());
        }
    }

    pub fn with_delay(&self, member_id: &str, delay: Duration) {
        self.delays.lock().expect("lock").insert(member_id.to_string(), delay);
    }

    pub fn calls_for(&self, member_id: &str) -> u32 {
        self.call_counts.lock().expect("lock").get(member_id).copied().unwrap_or(0)
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn send_request<'a>(
        &'a self,
        member: &'a CouncilMember,
        _prompt: &'a str,
        _context: Option<&'a str>,
    ) -> AdapterFuture<'a> {
        Box::pin(async move {
            *self.call_counts.lock().expect("lock").entry(member.id.clone()).or_insert(0) += 1;
            if let Some(delay) = self.delays.lock().expect("lock").get(&member.id).copied() {
                tokio::time::sleep(delay).await;
            }
            self.scripts
                .lock()
                .expect("lock")
                .get_mut(&member.id)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| Err(ProviderError::new(ErrorKind::UnknownError, "no script queued")))
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = ProviderHealthProbe> + Send + 'a>> {
        Box::pin(async move {
            ProviderHealthProbe {
                available: true,
                latency_ms: Some(0),
            }
        })
    }
}

pub fn ok(content: &str, prompt_tokens: u32, completion_tokens: u32) -> Result<ProviderResponse, ProviderError> {
    Ok(ProviderResponse {
        content: content.to_string(),
        token_usage: TokenUsage::new(prompt_tokens, completion_tokens),
        latency_ms: 5,
    })
}

pub fn err(kind: ErrorKind, message: &str) -> Result<ProviderResponse, ProviderError> {
    Err(ProviderError::new(kind, message))
}

pub fn member(id: &str, provider: council_core::models::ProviderTag) -> CouncilMember {
    CouncilMember {
        id: id.to_string(),
        provider,
        model: "stub-model".to_string(),
        timeout_seconds: 5,
        retry_policy: RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 1.0,
            retryable_errors: vec![ErrorKind::Timeout, ErrorKind::ServiceUnavailable, ErrorKind::RateLimit],
        },
        weight: None,
    }
}

/// `ConfigurationProvider` whose four sub-configs are handed over at
/// construction and returned verbatim — hand-built for each test rather
/// than an env-backed one.
pub struct FixedConfig {
    pub council: CouncilConfig,
    pub deliberation: DeliberationConfig,
    pub synthesis: SynthesisConfig,
    pub performance: PerformanceConfig,
}

impl ConfigurationProvider for FixedConfig {
    fn council_config(&self) -> CouncilConfig {
        self.council.clone()
    }
    fn deliberation_config(&self) -> DeliberationConfig {
        self.deliberation.clone()
    }
    fn synthesis_config(&self) -> SynthesisConfig {
        self.synthesis.clone()
    }
    fn performance_config(&self) -> PerformanceConfig {
        self.performance.clone()
    }
}

#[derive(Default)]
pub struct RecordingEventSink {
    pub provider_failures: Mutex<Vec<(String, String)>>,
    pub decisions: Mutex<Vec<ConsensusDecision>>,
    pub negotiation_rounds: Mutex<u32>,
}

impl EventSink for RecordingEventSink {
    fn log_request(&self, _request_id: uuid::Uuid, _query: &str) {}
    fn log_council_response(&self, _request_id: uuid::Uuid, _response: &InitialResponse) {}
    fn log_deliberation_round(&self, _request_id: uuid::Uuid, _round: &DeliberationRound) {}
    fn log_consensus_decision(&self, _request_id: uuid::Uuid, decision: &ConsensusDecision) {
        self.decisions.lock().expect("lock").push(decision.clone());
    }
    fn log_cost(&self, _request_id: uuid::Uuid, _metrics: &RequestMetrics) {}
    fn log_provider_failure(&self, provider_id: &str, error: &str) {
        self.provider_failures
            .lock()
            .expect("lock")
            .push((provider_id.to_string(), error.to_string()));
    }
    fn log_negotiation_round(&self, _request_id: uuid::Uuid, _round_number: u32, _responses: &[NegotiationResponse]) {
        *self.negotiation_rounds.lock().expect("lock") += 1;
    }
    fn log_negotiation_response(&self, _request_id: uuid::Uuid, _response: &NegotiationResponse) {}
    fn log_consensus_metadata(&self, _request_id: uuid::Uuid, _metadata: &IterativeConsensusMetadata) {}
}

/// Deterministic embedder for tests: maps each distinct text to a one-hot
/// vector by first-seen order, so identical texts are perfectly similar and
/// distinct texts are orthogonal — enough to drive the convergence loop
/// through its decision states without a real embedding model.
#[derive(Default)]
pub struct OneHotEmbedder {
    seen: Mutex<Vec<String>>,
}

impl Embedder for OneHotEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> EmbeddingFuture<'a> {
        Box::pin(async move {
            let mut seen = self.seen.lock().expect("lock");
            let index = match seen.iter().position(|t| t == text) {
                Some(i) => i,
                None => {
                    seen.push(text.to_string());
                    seen.len() - 1
                }
            };
            let mut vector = vec![0f32; seen.len().max(8)];
            vector[index] = 1.0;
            vector
        })
    }

    fn model_id(&self) -> &str {
        "one-hot-test-embedder"
    }
}

/// Embedder whose similarity is driven directly by test-supplied scores
/// rather than derived from text content, for tests that need an exact
/// `averageSimilarity` progression.
pub struct ScriptedSimilarityEmbedder {
    // Each text maps to a 2-D point; cosine similarity between two points
    // on the unit circle is cos(angle difference), so picking angles lets
    // a test dial in an exact target similarity.
    points: Mutex<HashMap<String, (f32, f32)>>,
}

impl ScriptedSimilarityEmbedder {
    pub fn new() -> Self {
        Self {
            points: Mutex::new(HashMap::new()),
        }
    }

    pub fn assign(&self, text: &str, angle_radians: f32) {
        self.points
            .lock()
            .expect("lock")
            .insert(text.to_string(), (angle_radians.cos(), angle_radians.sin()));
    }
}

impl Embedder for ScriptedSimilarityEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> EmbeddingFuture<'a> {
        Box::pin(async move {
            let point = self
                .points
                .lock()
                .expect("lock")
                .get(text)
                .copied()
                .unwrap_or((1.0, 0.0));
            vec![point.0, point.1]
        })
    }

    fn model_id(&self) -> &str {
        "scripted-similarity-test-embedder"
    }
}

#[derive(Default)]
pub struct EmptyExamples;

impl ExampleRepository for EmptyExamples {
    fn relevant<'a>(
        &'a self,
        _query: &'a str,
        _k: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<NegotiationExample>> + Send + 'a>> {
        Box::pin(async move { Vec::new() })
    }
}

#[derive(Default)]
pub struct EmptySessions;

impl SessionProvider for EmptySessions {
    fn context_for<'a>(
        &'a self,
        _session_id: &'a str,
        _token_budget: u32,
    ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
        Box::pin(async move { String::new() })
    }
}
