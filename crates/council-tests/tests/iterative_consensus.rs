//! Iterative consensus negotiation end-to-end scenarios: convergence to
//! consensus, and stagnation into a deadlock-triggered fallback with human
//! escalation.

mod support;

use std::collections::HashMap;
use std::sync::Arc;

use council_core::collaborators::{CouncilConfig, DeliberationConfig, PerformanceConfig};
use council_core::models::{ProviderTag, UserRequest};
use council_core::provider::{HealthTracker, ProviderPool};
use council_core::synthesis::{FallbackStrategy, IterativeConsensusConfig, ModeratorStrategy, NegotiationMode, SynthesisConfig};
use council_core::Orchestrator;

use support::{member, ok, FixedConfig, RecordingEventSink, ScriptedAdapter, ScriptedSimilarityEmbedder};

fn performance() -> PerformanceConfig {
    PerformanceConfig {
        global_timeout_seconds: 10,
        enable_fast_fallback: true,
        streaming_enabled: false,
    }
}

fn base_iterative_config(max_rounds: u32, agreement_threshold: f64) -> IterativeConsensusConfig {
    IterativeConsensusConfig {
        max_rounds,
        agreement_threshold,
        fallback_strategy: FallbackStrategy::ConsensusExtraction,
        early_termination_enabled: true,
        early_termination_threshold: 0.95,
        negotiation_mode: NegotiationMode::Parallel,
        randomization_seed: None,
        per_round_timeout_seconds: 30,
        human_escalation_enabled: false,
        escalation_channels: Vec::new(),
        escalation_rate_limit_per_hour: 5,
        example_count: 0,
        prompt_templates: HashMap::new(),
    }
}

#[tokio::test]
async fn converges_and_stops_the_round_the_threshold_is_crossed() {
    let health = HealthTracker::default();
    let mut pool = ProviderPool::new(health.clone());
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.push("a", ok("seed-a", 10, 5));
    adapter.push("a", ok("round2-a", 20, 10));
    adapter.push("a", ok("round3-a", 20, 10));
    adapter.push("b", ok("seed-b", 10, 5));
    adapter.push("b", ok("round2-b", 20, 10));
    adapter.push("b", ok("round3-b", 20, 10));
    pool.register(ProviderTag::OpenAi, adapter.clone());

    let embedder = Arc::new(ScriptedSimilarityEmbedder::new());
    embedder.assign("seed-a", 0.0);
    embedder.assign("seed-b", (0.6f32).acos());
    embedder.assign("round2-a", 0.0);
    embedder.assign("round2-b", (0.72f32).acos());
    embedder.assign("round3-a", 0.0);
    embedder.assign("round3-b", (0.88f32).acos());

    let members = vec![member("a", ProviderTag::OpenAi), member("b", ProviderTag::OpenAi)];
    let mut synthesis = SynthesisConfig::consensus_extraction();
    synthesis.strategy = council_core::models::SynthesisStrategyTag::IterativeConsensus;
    synthesis.moderator_strategy = ModeratorStrategy::Strongest;
    synthesis.iterative_consensus = base_iterative_config(5, 0.85);

    let config = FixedConfig {
        council: CouncilConfig {
            members,
            require_minimum_for_consensus: true,
            minimum_size: 2,
        },
        deliberation: DeliberationConfig { rounds: 0 },
        synthesis,
        performance: performance(),
    };

    let orchestrator = Orchestrator::new(
        Arc::new(config),
        pool,
        health,
        Arc::new(RecordingEventSink::default()),
        embedder,
        Arc::new(support::EmptyExamples),
        Arc::new(support::EmptySessions),
    );

    let request = UserRequest::new("converging query");
    let result = orchestrator.process_request(&request).await.expect("should converge to consensus");

    let metadata = result
        .consensus_decision
        .iterative_consensus_metadata
        .expect("iterative consensus must attach metadata");
    assert_eq!(metadata.total_rounds, 3);
    assert!(metadata.consensus_achieved);
    assert!(!metadata.fallback_used);
    assert_eq!(metadata.similarity_progression.len(), 3);
    assert!((metadata.similarity_progression[0] - 0.6).abs() < 1e-4);
    assert!((metadata.similarity_progression[1] - 0.72).abs() < 1e-4);
    assert!((metadata.similarity_progression[2] - 0.88).abs() < 1e-4);
}

#[tokio::test]
async fn stagnation_triggers_deadlock_detection_escalation_and_fallback() {
    let health = HealthTracker::default();
    let mut pool = ProviderPool::new(health.clone());
    let adapter = Arc::new(ScriptedAdapter::new());
    // round-0 seed
    adapter.push("a", ok("stuck-a", 10, 5));
    adapter.push("b", ok("stuck-b", 10, 5));
    // rounds 2, 3, 4 all repeat the same stagnant content
    for _ in 0..3 {
        adapter.push("a", ok("stuck-a", 10, 5));
        adapter.push("b", ok("stuck-b", 10, 5));
    }
    // fallback reducer call defaults to the first member, "a"
    adapter.push("a", ok("fallback synthesis after deadlock", 30, 15));
    pool.register(ProviderTag::OpenAi, adapter.clone());

    let embedder = Arc::new(ScriptedSimilarityEmbedder::new());
    embedder.assign("stuck-a", 0.0);
    embedder.assign("stuck-b", (0.5f32).acos());

    let members = vec![member("a", ProviderTag::OpenAi), member("b", ProviderTag::OpenAi)];
    let mut synthesis = SynthesisConfig::consensus_extraction();
    synthesis.strategy = council_core::models::SynthesisStrategyTag::IterativeConsensus;
    let mut iter_config = base_iterative_config(4, 0.85);
    iter_config.human_escalation_enabled = true;
    iter_config.escalation_channels = vec!["ops-oncall".to_string()];
    synthesis.iterative_consensus = iter_config;

    let config = FixedConfig {
        council: CouncilConfig {
            members,
            require_minimum_for_consensus: true,
            minimum_size: 2,
        },
        deliberation: DeliberationConfig { rounds: 0 },
        synthesis,
        performance: performance(),
    };

    let events = Arc::new(RecordingEventSink::default());
    let orchestrator = Orchestrator::new(
        Arc::new(config),
        pool,
        health,
        events.clone(),
        embedder,
        Arc::new(support::EmptyExamples),
        Arc::new(support::EmptySessions),
    );

    let request = UserRequest::new("stagnant query");
    let result = orchestrator.process_request(&request).await.expect("fallback should still produce a decision");

    let metadata = result
        .consensus_decision
        .iterative_consensus_metadata
        .expect("iterative consensus must attach metadata even on fallback");
    assert_eq!(metadata.total_rounds, 4);
    assert!(!metadata.consensus_achieved);
    assert!(metadata.fallback_used);
    assert!(metadata.deadlock_detected);
    assert!(metadata.human_escalation_triggered);
    assert_ne!(
        result.consensus_decision.synthesis_strategy,
        council_core::models::SynthesisStrategyTag::IterativeConsensus,
        "the surfaced decision's strategy tag must reflect the fallback, not iterative-consensus itself"
    );
}
