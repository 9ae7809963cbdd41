//! Iterative consensus negotiation. State machine:
//! `INIT -> PROPOSE -> SIMILARITY -> DECIDE -> {DONE_CONSENSUS | DONE_EARLY |
//! DONE_FALLBACK | DONE_ESCALATED}`.
//!
//! Grounded in the same attempt-loop-with-a-terminal-condition shape used
//! elsewhere for bounded retry, generalized from "retry a single call" to
//! "negotiate across members until similarity converges".

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::errors::CoreError;
use crate::models::{
    Confidence, ConsensusDecision, ConvergenceTrend, CouncilMember, DeadlockRisk, InitialResponse,
    IterativeConsensusMetadata, NegotiationResponse, SynthesisStrategyTag, TokenUsage,
};
use crate::similarity::{similarity, EmbeddingCache};

use super::{
    consensus_extraction, meta_synthesis, weighted_fusion, IterativeConsensusConfig,
    SynthesisConfig, SynthesisContext, SynthesisInput,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationMode {
    Parallel,
    Sequential,
}

/// Full history of negotiation rounds, one entry per round in order.
#[derive(Debug, Clone, Default)]
pub struct NegotiationTrace {
    pub rounds: Vec<Vec<NegotiationResponse>>,
}

enum Decision {
    Continue,
    DoneEarly,
    DoneConsensus,
    DoneFallback { deadlock: bool, escalated: bool },
}

struct RoundOutcome {
    responses: Vec<NegotiationResponse>,
    effective_contents: HashMap<String, String>,
}

pub(super) async fn synthesize_via_iterative_consensus(
    input: &SynthesisInput<'_>,
    config: &SynthesisConfig,
    ctx: &SynthesisContext<'_>,
) -> Result<ConsensusDecision, CoreError> {
    if input.initial_responses.is_empty() {
        return Err(CoreError::SynthesisFailed(
            "no member responses to seed iterative consensus".to_string(),
        ));
    }

    let iter_config = &config.iterative_consensus;
    let mut cache = EmbeddingCache::new();
    let mut progression: Vec<f64> = Vec::new();
    let mut trace = NegotiationTrace::default();
    let mut live: Vec<String> = input
        .initial_responses
        .iter()
        .map(|r| r.council_member_id.clone())
        .collect();
    let mut absences: HashMap<String, u32> = HashMap::new();
    let mut last_content: HashMap<String, String> = input
        .initial_responses
        .iter()
        .map(|r| (r.council_member_id.clone(), r.content.clone()))
        .collect();

    let mut round_num: u32 = 1;
    let mut round = seed_round(input.initial_responses);
    let loop_started_at = Instant::now();

    loop {
        let order: Vec<String> = round.responses.iter().map(|r| r.council_member_id.clone()).collect();
        let texts: Vec<String> = order
            .iter()
            .map(|id| round.effective_contents.get(id).cloned().unwrap_or_default())
            .collect();

        let sim = similarity(&texts, ctx.embedder, &mut cache, iter_config.agreement_threshold).await;
        progression.push(sim.average_similarity);
        trace.rounds.push(round.responses.clone());

        let decision = decide(&progression, round_num, iter_config, ctx);

        match decision {
            Decision::DoneEarly => {
                let decision = build_success_decision(&round, &order, &texts, round_num, &progression, iter_config, true);
                if let Some(metadata) = &decision.iterative_consensus_metadata {
                    ctx.events.log_consensus_metadata(ctx.request_id, metadata);
                }
                return Ok(decision);
            }
            Decision::DoneConsensus => {
                let decision = build_success_decision(&round, &order, &texts, round_num, &progression, iter_config, false);
                if let Some(metadata) = &decision.iterative_consensus_metadata {
                    ctx.events.log_consensus_metadata(ctx.request_id, metadata);
                }
                return Ok(decision);
            }
            Decision::DoneFallback { deadlock, escalated } => {
                return build_fallback_decision(
                    input, config, ctx, &round, round_num, &progression, deadlock, escalated,
                )
                .await;
            }
            Decision::Continue => {
                round_num += 1;
                for id in &live {
                    if !order.contains(id) {
                        *absences.entry(id.clone()).or_insert(0) += 1;
                    } else {
                        absences.insert(id.clone(), 0);
                    }
                }
                live.retain(|id| absences.get(id).copied().unwrap_or(0) < 3);

                for response in &round.responses {
                    last_content.insert(
                        response.council_member_id.clone(),
                        response.content.clone(),
                    );
                }

                round = propose_round(
                    input,
                    &live,
                    &last_content,
                    round_num,
                    iter_config,
                    ctx,
                )
                .await;
            }
        }

        if loop_started_at.elapsed() > Duration::from_secs(iter_config.per_round_timeout_seconds * iter_config.max_rounds as u64 * 2) {
            // Backstop against a misconfigured loop outrunning any sane wall clock budget.
            return build_fallback_decision(
                input, config, ctx, &round, round_num, &progression, true, false,
            )
            .await;
        }
    }
}

fn seed_round(initial_responses: &[InitialResponse]) -> RoundOutcome {
    let responses: Vec<NegotiationResponse> = initial_responses
        .iter()
        .map(|r| NegotiationResponse {
            council_member_id: r.council_member_id.clone(),
            content: r.content.clone(),
            round_number: 1,
            agrees_with_member_id: None,
            embedding: None,
            token_count: r.token_usage.total,
        })
        .collect();
    let effective_contents = responses
        .iter()
        .map(|r| (r.council_member_id.clone(), r.content.clone()))
        .collect();
    RoundOutcome {
        responses,
        effective_contents,
    }
}

fn deltas(progression: &[f64]) -> Vec<f64> {
    progression.windows(2).map(|w| w[1] - w[0]).collect()
}

fn convergence_trend(progression: &[f64]) -> ConvergenceTrend {
    match deltas(progression).last() {
        Some(&delta) if delta > 0.02 => ConvergenceTrend::Converging,
        Some(&delta) if delta < -0.02 => ConvergenceTrend::Diverging,
        _ => ConvergenceTrend::Stagnant,
    }
}

fn deadlock_risk(progression: &[f64], round: u32, max_rounds: u32) -> DeadlockRisk {
    let deltas = deltas(progression);
    let last_two: Vec<f64> = deltas.iter().rev().take(2).copied().collect();
    let nonpositive = last_two.iter().filter(|d| **d <= 0.0).count();
    let at_or_past_mid = f64::from(round) >= f64::from(max_rounds) / 2.0;
    if nonpositive == 2 && last_two.len() == 2 && at_or_past_mid {
        DeadlockRisk::High
    } else if nonpositive == 1 {
        DeadlockRisk::Medium
    } else {
        DeadlockRisk::Low
    }
}

fn decide(
    progression: &[f64],
    round: u32,
    config: &IterativeConsensusConfig,
    ctx: &SynthesisContext<'_>,
) -> Decision {
    let avg = *progression.last().expect("progression has at least one entry");
    let _trend = convergence_trend(progression);

    if config.early_termination_enabled && avg >= config.early_termination_threshold {
        return Decision::DoneEarly;
    }
    if avg >= config.agreement_threshold {
        return Decision::DoneConsensus;
    }
    if round >= config.max_rounds {
        let risk = deadlock_risk(progression, round, config.max_rounds);
        let deadlock = risk == DeadlockRisk::High;
        let escalated = deadlock
            && config.human_escalation_enabled
            && escalation_allowed(config.escalation_rate_limit_per_hour);
        if escalated {
            for channel in &config.escalation_channels {
                ctx.events
                    .log_provider_failure(channel, "iterative consensus deadlock escalation");
            }
        }
        return Decision::DoneFallback { deadlock, escalated };
    }
    Decision::Continue
}

/// Process-wide token-bucket-style limiter for human-escalation events,
/// generalizing the same sliding-window counter shape used elsewhere for
/// per-user request budgets to a single global escalation budget.
fn escalation_allowed(limit_per_hour: u32) -> bool {
    use std::sync::{Mutex, OnceLock};

    static TIMESTAMPS: OnceLock<Mutex<Vec<Instant>>> = OnceLock::new();
    let lock = TIMESTAMPS.get_or_init(|| Mutex::new(Vec::new()));
    let mut timestamps = lock.lock().expect("escalation limiter lock poisoned");
    let now = Instant::now();
    timestamps.retain(|t| now.duration_since(*t) < Duration::from_secs(3600));
    if timestamps.len() as u32 >= limit_per_hour {
        false
    } else {
        timestamps.push(now);
        true
    }
}

fn member_order(
    round_num: u32,
    live: &[String],
    config: &IterativeConsensusConfig,
) -> Vec<String> {
    let mut ordered = live.to_vec();
    match config.negotiation_mode {
        NegotiationMode::Parallel => ordered,
        NegotiationMode::Sequential => {
            match config.randomization_seed {
                Some(seed) => {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(u64::from(round_num)));
                    ordered.shuffle(&mut rng);
                }
                None => ordered.sort(),
            }
            ordered
        }
    }
}

fn negotiation_prompt(
    query: &str,
    own_previous: &str,
    peers_previous: &[(String, String)],
    examples: &[crate::collaborators::NegotiationExample],
) -> String {
    let mut prompt = format!(
        "Original query: {query}\n\nYour previous response:\n{own_previous}\n\nPeers' previous responses:\n"
    );
    for (peer_id, content) in peers_previous {
        prompt.push_str(&format!("\n[{peer_id}]: {content}\n"));
    }
    if !examples.is_empty() {
        prompt.push_str("\nPast negotiation examples for reference:\n");
        for example in examples {
            prompt.push_str(&format!(
                "\nQ: {}\nResolution: {}\n",
                example.query, example.resolution
            ));
        }
    }
    prompt.push_str(
        "\nRefine your answer, or if you fully agree with a peer, reply starting with \
         \"ENDORSE: <memberId>\" naming that peer. Otherwise reply starting with \"REFINE:\" \
         followed by your refined answer.",
    );
    prompt
}

fn parse_negotiation_reply(raw: &str) -> (Option<String>, String) {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix("ENDORSE:") {
        let member_id = rest.trim().lines().next().unwrap_or("").trim().to_string();
        return (Some(member_id), raw.to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("REFINE:") {
        return (None, rest.trim().to_string());
    }
    (None, raw.to_string())
}

async fn propose_round(
    input: &SynthesisInput<'_>,
    live: &[String],
    last_content: &HashMap<String, String>,
    round_num: u32,
    config: &IterativeConsensusConfig,
    ctx: &SynthesisContext<'_>,
) -> RoundOutcome {
    let member_by_id: HashMap<&str, &CouncilMember> =
        input.members.iter().map(|m| (m.id.as_str(), m)).collect();
    let examples = ctx
        .examples
        .relevant(&input.request.query, config.example_count)
        .await;
    let timeout = Duration::from_secs(config.per_round_timeout_seconds);

    let order = member_order(round_num, live, config);
    let mut collected: Vec<NegotiationResponse> = Vec::new();
    let mut round_content: HashMap<String, String> = HashMap::new();

    match config.negotiation_mode {
        NegotiationMode::Parallel => {
            let mut tasks = Vec::new();
            for member_id in &order {
                let Some(member) = member_by_id.get(member_id.as_str()).copied() else {
                    continue;
                };
                let own_previous = last_content.get(member_id).cloned().unwrap_or_default();
                let peers_previous: Vec<(String, String)> = live
                    .iter()
                    .filter(|id| *id != member_id)
                    .map(|id| (id.clone(), last_content.get(id).cloned().unwrap_or_default()))
                    .collect();
                let prompt = negotiation_prompt(&input.request.query, &own_previous, &peers_previous, &examples);
                tasks.push(async move {
                    let result = tokio::time::timeout(timeout, ctx.pool.send_request(member, &prompt, None)).await;
                    (member_id.clone(), result)
                });
            }
            let results = futures::future::join_all(tasks).await;
            for (member_id, result) in results {
                if let Ok(Ok(response)) = result {
                    ctx.metrics.record(
                        &member_id,
                        &member_by_id.get(member_id.as_str()).map(|m| m.model.as_str()).unwrap_or_default(),
                        &response.token_usage,
                        response.latency_ms,
                    );
                    let (agrees_with, content) = parse_negotiation_reply(&response.content);
                    round_content.insert(member_id.clone(), content.clone());
                    let negotiation_response = NegotiationResponse {
                        council_member_id: member_id,
                        content,
                        round_number: round_num,
                        agrees_with_member_id: agrees_with,
                        embedding: None,
                        token_count: response.token_usage.total,
                    };
                    ctx.events.log_negotiation_response(ctx.request_id, &negotiation_response);
                    collected.push(negotiation_response);
                }
            }
        }
        NegotiationMode::Sequential => {
            for member_id in &order {
                let Some(member) = member_by_id.get(member_id.as_str()).copied() else {
                    continue;
                };
                let own_previous = last_content.get(member_id).cloned().unwrap_or_default();
                let peers_previous: Vec<(String, String)> = live
                    .iter()
                    .filter(|id| *id != member_id)
                    .map(|id| {
                        let content = round_content
                            .get(id)
                            .or_else(|| last_content.get(id))
                            .cloned()
                            .unwrap_or_default();
                        (id.clone(), content)
                    })
                    .collect();
                let prompt = negotiation_prompt(&input.request.query, &own_previous, &peers_previous, &examples);
                let result = tokio::time::timeout(timeout, ctx.pool.send_request(member, &prompt, None)).await;
                if let Ok(Ok(response)) = result {
                    ctx.metrics.record(member_id, &member.model, &response.token_usage, response.latency_ms);
                    let (agrees_with, content) = parse_negotiation_reply(&response.content);
                    round_content.insert(member_id.clone(), content.clone());
                    let negotiation_response = NegotiationResponse {
                        council_member_id: member_id.clone(),
                        content,
                        round_number: round_num,
                        agrees_with_member_id: agrees_with,
                        embedding: None,
                        token_count: response.token_usage.total,
                    };
                    ctx.events.log_negotiation_response(ctx.request_id, &negotiation_response);
                    collected.push(negotiation_response);
                }
            }
        }
    }

    ctx.events.log_negotiation_round(ctx.request_id, round_num, &collected);
    let effective_contents = effective_contents_for(&collected);
    RoundOutcome {
        responses: collected,
        effective_contents,
    }
}

/// Applies the endorsement tie-break: an endorser's content is treated as a
/// copy of the endorsed peer's content for similarity purposes only, within
/// that same round.
fn effective_contents_for(responses: &[NegotiationResponse]) -> HashMap<String, String> {
    let raw: HashMap<&str, &str> = responses
        .iter()
        .map(|r| (r.council_member_id.as_str(), r.content.as_str()))
        .collect();
    responses
        .iter()
        .map(|r| {
            let content = match &r.agrees_with_member_id {
                Some(peer_id) => raw.get(peer_id.as_str()).copied().unwrap_or(&r.content),
                None => r.content.as_str(),
            };
            (r.council_member_id.clone(), content.to_string())
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn build_success_decision(
    round: &RoundOutcome,
    order: &[String],
    texts: &[String],
    total_rounds: u32,
    progression: &[f64],
    config: &IterativeConsensusConfig,
    early: bool,
) -> ConsensusDecision {
    let centroid_index = centroid_index(texts);
    let content = texts
        .get(centroid_index)
        .cloned()
        .unwrap_or_else(|| round.responses.first().map(|r| r.content.clone()).unwrap_or_default());

    let quality_score = progression.last().copied().unwrap_or(0.0)
        * (1.0 - (f64::from(total_rounds) / f64::from(config.max_rounds) / 2.0));

    let cost_savings_tokens_avoided = if early {
        let total_tokens: u64 = round.responses.iter().map(|r| u64::from(r.token_count)).sum();
        let avg_round_tokens = total_tokens / round.responses.len().max(1) as u64;
        let skipped_rounds = u64::from(config.max_rounds.saturating_sub(total_rounds));
        Some(avg_round_tokens * skipped_rounds)
    } else {
        None
    };

    let agreement_level = progression.last().copied().unwrap_or(0.0);

    ConsensusDecision {
        content,
        confidence: Confidence::discretize(agreement_level),
        agreement_level,
        synthesis_strategy: SynthesisStrategyTag::IterativeConsensus,
        contributing_members: order.to_vec(),
        timestamp: Utc::now(),
        iterative_consensus_metadata: Some(IterativeConsensusMetadata {
            total_rounds,
            similarity_progression: progression.to_vec(),
            consensus_achieved: true,
            fallback_used: false,
            fallback_reason: None,
            deadlock_detected: false,
            human_escalation_triggered: false,
            quality_score,
            cost_savings_tokens_avoided,
        }),
    }
}

/// The response whose content is, on average, most similar to every other
/// response this round — used as the final answer once consensus has been
/// declared (all contents are near-identical by definition at that point).
fn centroid_index(texts: &[String]) -> usize {
    let n = texts.len();
    if n == 0 {
        return 0;
    }
    let scores: Vec<&str> = texts.iter().map(String::as_str).collect();
    (0..n)
        .max_by(|&i, &j| {
            let score_i: f64 = (0..n)
                .filter(|&k| k != i)
                .map(|k| super::word_overlap_score(scores[i], scores[k]))
                .sum();
            let score_j: f64 = (0..n)
                .filter(|&k| k != j)
                .map(|k| super::word_overlap_score(scores[j], scores[k]))
                .sum();
            score_i.partial_cmp(&score_j).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0)
}

async fn build_fallback_decision(
    input: &SynthesisInput<'_>,
    config: &SynthesisConfig,
    ctx: &SynthesisContext<'_>,
    round: &RoundOutcome,
    total_rounds: u32,
    progression: &[f64],
    deadlock: bool,
    escalated: bool,
) -> Result<ConsensusDecision, CoreError> {
    let synthetic_initial: Vec<InitialResponse> = round
        .responses
        .iter()
        .map(|r| InitialResponse {
            council_member_id: r.council_member_id.clone(),
            content: round
                .effective_contents
                .get(&r.council_member_id)
                .cloned()
                .unwrap_or_else(|| r.content.clone()),
            token_usage: TokenUsage::new(0, r.token_count),
            latency_ms: 0,
            timestamp: Utc::now(),
        })
        .collect();

    let fallback_config = config.fallback_config();
    let fallback_input = SynthesisInput {
        request: input.request,
        members: input.members,
        initial_responses: &synthetic_initial,
        deliberation: None,
    };

    let mut decision = match fallback_config.strategy {
        SynthesisStrategyTag::WeightedFusion => {
            weighted_fusion::synthesize(&fallback_input, &fallback_config, ctx).await?
        }
        SynthesisStrategyTag::MetaSynthesis => {
            meta_synthesis::synthesize(&fallback_input, &fallback_config, ctx).await?
        }
        _ => consensus_extraction::synthesize(&fallback_input, &fallback_config, ctx).await?,
    };

    let quality_score = progression.last().copied().unwrap_or(0.0)
        * (1.0 - (f64::from(total_rounds) / f64::from(config.iterative_consensus.max_rounds) / 2.0));

    decision.iterative_consensus_metadata = Some(IterativeConsensusMetadata {
        total_rounds,
        similarity_progression: progression.to_vec(),
        consensus_achieved: false,
        fallback_used: true,
        fallback_reason: Some(if deadlock {
            "deadlock detected before reaching agreement threshold".to_string()
        } else {
            "max rounds reached without consensus".to_string()
        }),
        deadlock_detected: deadlock,
        human_escalation_triggered: escalated,
        quality_score,
        cost_savings_tokens_avoided: None,
    });

    if let Some(metadata) = &decision.iterative_consensus_metadata {
        ctx.events.log_consensus_metadata(ctx.request_id, metadata);
    }

    Ok(decision)
}

