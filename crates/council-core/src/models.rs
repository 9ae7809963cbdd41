//! Core data model shared by the provider pool, orchestrator, and synthesis
//! engine. Nothing here owns behavior, only shape.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag identifying which wire protocol a `CouncilMember` speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTag {
    OpenAi,
    Anthropic,
    Google,
    Xai,
}

/// One configured LLM endpoint participating in the council.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilMember {
    pub id: String,
    pub provider: ProviderTag,
    pub model: String,
    pub timeout_seconds: u64,
    pub retry_policy: RetryPolicy,
    pub weight: Option<f64>,
}

impl CouncilMember {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

/// Retry/backoff policy for a single council member, enforced by the
/// provider pool, never by the adapter itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub retryable_errors: Vec<ErrorKind>,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let scaled = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_delay_ms as f64).max(0.0);
        std::time::Duration::from_millis(capped as u64)
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable_errors.contains(&kind)
    }
}

/// Error kinds every adapter must normalize a failure into. Used both for
/// adapter-level classification and as the caller-facing error surfaced
/// from `processRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Timeout,
    RateLimit,
    ServiceUnavailable,
    AuthenticationError,
    InvalidRequest,
    NetworkError,
    UnknownError,
    ProviderNotConfigured,
    ProviderDisabled,
    InsufficientMembers,
    GlobalDeadlineExceeded,
    SynthesisFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub status: HealthStatus,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub last_failure: Option<DateTime<Utc>>,
    pub disabled_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRequest {
    pub id: Uuid,
    pub query: String,
    pub session_id: Option<String>,
    pub context: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub preset: Option<String>,
}

impl UserRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            session_id: None,
            context: None,
            timestamp: Utc::now(),
            preset: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt,
            completion,
            total: prompt.saturating_add(completion),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialResponse {
    pub council_member_id: String,
    pub content: String,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationExchange {
    pub council_member_id: String,
    pub content: String,
    pub references_to: Vec<String>,
    pub token_usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationRound {
    pub round_number: u32,
    pub exchanges: Vec<DeliberationExchange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliberationThread {
    pub rounds: Vec<DeliberationRound>,
}

/// A negotiation contribution in the iterative-consensus loop. Unique on
/// `(round_number, council_member_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationResponse {
    pub council_member_id: String,
    pub content: String,
    pub round_number: u32,
    pub agrees_with_member_id: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub token_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub matrix: Vec<Vec<f64>>,
    pub average_similarity: f64,
    pub min_similarity: f64,
    pub max_similarity: f64,
    pub below_threshold_pairs: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn discretize(agreement_level: f64) -> Self {
        if agreement_level >= 0.8 {
            Confidence::High
        } else if agreement_level >= 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SynthesisStrategyTag {
    ConsensusExtraction,
    WeightedFusion,
    MetaSynthesis,
    IterativeConsensus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlockRisk {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceTrend {
    Converging,
    Diverging,
    Stagnant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterativeConsensusMetadata {
    pub total_rounds: u32,
    pub similarity_progression: Vec<f64>,
    pub consensus_achieved: bool,
    pub fallback_used: bool,
    pub fallback_reason: Option<String>,
    pub deadlock_detected: bool,
    pub human_escalation_triggered: bool,
    pub quality_score: f64,
    pub cost_savings_tokens_avoided: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusDecision {
    pub content: String,
    pub confidence: Confidence,
    pub agreement_level: f64,
    pub synthesis_strategy: SynthesisStrategyTag,
    pub contributing_members: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub iterative_consensus_metadata: Option<IterativeConsensusMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberMetrics {
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub member_metrics: HashMap<String, MemberMetrics>,
}

impl RequestMetrics {
    pub fn record(&mut self, member_id: &str, usage: &TokenUsage, latency_ms: u64, cost_usd: f64) {
        let entry = self.member_metrics.entry(member_id.to_string()).or_default();
        entry.latency_ms = entry.latency_ms.saturating_add(latency_ms);
        entry.prompt_tokens = entry.prompt_tokens.saturating_add(usage.prompt);
        entry.completion_tokens = entry.completion_tokens.saturating_add(usage.completion);
        entry.cost_usd += cost_usd;
    }

    pub fn total_tokens(&self) -> u64 {
        self.member_metrics
            .values()
            .map(|m| u64::from(m.prompt_tokens) + u64::from(m.completion_tokens))
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequestResult {
    pub consensus_decision: ConsensusDecision,
    pub metrics: RequestMetrics,
}
