//! Synthesis engine. Dispatches over a tagged-union strategy set by tag,
//! the same registry-keyed-by-an-enum shape used for provider dispatch (see
//! `provider::pool`) rather than an open class hierarchy.

mod consensus_extraction;
mod iterative;
mod meta_synthesis;
mod weighted_fusion;

pub use iterative::{NegotiationMode, NegotiationTrace};

use std::collections::HashMap;

use crate::collaborators::{Embedder, EventSink, ExampleRepository};
use crate::errors::CoreError;
use crate::metrics::MetricsSink;
use crate::models::{
    CouncilMember, ConsensusDecision, DeliberationThread, InitialResponse, SynthesisStrategyTag,
    UserRequest,
};
use crate::provider::{HealthTracker, ProviderPool};

/// Strategy for picking the moderator in `meta-synthesis`.
#[derive(Debug, Clone)]
pub enum ModeratorStrategy {
    Permanent(String),
    Rotate,
    Strongest,
}

/// One of the three non-iterative strategies, used as `iterative-consensus`'s
/// fallback target — never itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    ConsensusExtraction,
    WeightedFusion,
    MetaSynthesis,
}

impl FallbackStrategy {
    fn as_tag(self) -> SynthesisStrategyTag {
        match self {
            FallbackStrategy::ConsensusExtraction => SynthesisStrategyTag::ConsensusExtraction,
            FallbackStrategy::WeightedFusion => SynthesisStrategyTag::WeightedFusion,
            FallbackStrategy::MetaSynthesis => SynthesisStrategyTag::MetaSynthesis,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IterativeConsensusConfig {
    pub max_rounds: u32,
    pub agreement_threshold: f64,
    pub fallback_strategy: FallbackStrategy,
    pub early_termination_enabled: bool,
    pub early_termination_threshold: f64,
    pub negotiation_mode: NegotiationMode,
    pub randomization_seed: Option<u64>,
    pub per_round_timeout_seconds: u64,
    pub human_escalation_enabled: bool,
    pub escalation_channels: Vec<String>,
    pub escalation_rate_limit_per_hour: u32,
    pub example_count: usize,
    pub prompt_templates: HashMap<String, String>,
}

impl Default for IterativeConsensusConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            agreement_threshold: 0.8,
            fallback_strategy: FallbackStrategy::ConsensusExtraction,
            early_termination_enabled: true,
            early_termination_threshold: 0.95,
            negotiation_mode: NegotiationMode::Sequential,
            randomization_seed: None,
            per_round_timeout_seconds: 30,
            human_escalation_enabled: false,
            escalation_channels: Vec::new(),
            escalation_rate_limit_per_hour: 5,
            example_count: 0,
            prompt_templates: HashMap::new(),
        }
    }
}

/// Snapshot of the configured synthesis strategy plus its payload, taken
/// once per request along with the rest of `ConfigurationSnapshot`.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub strategy: SynthesisStrategyTag,
    pub reducer_member_id: Option<String>,
    pub weights: HashMap<String, f64>,
    pub moderator_strategy: ModeratorStrategy,
    pub iterative_consensus: IterativeConsensusConfig,
}

impl SynthesisConfig {
    pub fn consensus_extraction() -> Self {
        Self {
            strategy: SynthesisStrategyTag::ConsensusExtraction,
            reducer_member_id: None,
            weights: HashMap::new(),
            moderator_strategy: ModeratorStrategy::Strongest,
            iterative_consensus: IterativeConsensusConfig::default(),
        }
    }

    /// Builds a config for the fallback strategy named by `iterative_consensus`,
    /// reusing this config's reducer/weights/moderator settings so the
    /// fallback behaves exactly as it would if configured directly.
    fn fallback_config(&self) -> SynthesisConfig {
        SynthesisConfig {
            strategy: self.iterative_consensus.fallback_strategy.as_tag(),
            reducer_member_id: self.reducer_member_id.clone(),
            weights: self.weights.clone(),
            moderator_strategy: self.moderator_strategy.clone(),
            iterative_consensus: IterativeConsensusConfig::default(),
        }
    }
}

/// Everything synthesis needs beyond the thread/trace itself: access back
/// into the provider pool (for reducer/moderator calls and iterative
/// negotiation rounds), the health tracker (for `strongest` moderator
/// selection), the embedder and example repository (iterative consensus
/// only), and the event sink for best-effort logging.
pub struct SynthesisContext<'a> {
    pub pool: &'a ProviderPool,
    pub health: &'a HealthTracker,
    pub embedder: &'a dyn Embedder,
    pub examples: &'a dyn ExampleRepository,
    pub events: &'a dyn EventSink,
    pub metrics: &'a MetricsSink,
    pub request_id: uuid::Uuid,
}

pub struct SynthesisInput<'a> {
    pub request: &'a UserRequest,
    pub members: &'a [CouncilMember],
    pub initial_responses: &'a [InitialResponse],
    pub deliberation: Option<&'a DeliberationThread>,
}

/// Textual-overlap agreement score used by `consensus-extraction` and
/// `weighted-fusion`. Jaccard similarity over lowercased whitespace tokens —
/// cheap, deterministic, and good enough as an agreement proxy when no
/// embedder call is warranted for a non-iterative strategy.
pub(crate) fn word_overlap_score(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let tokens_a: HashSet<String> = a.split_whitespace().map(str::to_ascii_lowercase).collect();
    let tokens_b: HashSet<String> = b.split_whitespace().map(str::to_ascii_lowercase).collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

pub(crate) fn average_pairwise_overlap(contents: &[&str]) -> f64 {
    let n = contents.len();
    if n < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut count = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            total += word_overlap_score(contents[i], contents[j]);
            count += 1;
        }
    }
    if count == 0 {
        1.0
    } else {
        total / count as f64
    }
}

/// Entry point for C5. Dispatches by tag; `iterative-consensus` delegates to
/// C6 (`synthesis::iterative`).
pub async fn synthesize(
    input: SynthesisInput<'_>,
    config: &SynthesisConfig,
    ctx: &SynthesisContext<'_>,
) -> Result<ConsensusDecision, CoreError> {
    match config.strategy {
        SynthesisStrategyTag::ConsensusExtraction => {
            consensus_extraction::synthesize(&input, config, ctx).await
        }
        SynthesisStrategyTag::WeightedFusion => {
            weighted_fusion::synthesize(&input, config, ctx).await
        }
        SynthesisStrategyTag::MetaSynthesis => meta_synthesis::synthesize(&input, config, ctx).await,
        SynthesisStrategyTag::IterativeConsensus => {
            iterative::synthesize_via_iterative_consensus(&input, config, ctx).await
        }
    }
}
