//! `weighted-fusion` strategy. Same reducer-call shape as
//! `consensus-extraction`, but the prompt carries each member's normalized
//! weight so the reducer can favor higher-weighted opinions.

use chrono::Utc;

use crate::errors::CoreError;
use crate::models::{Confidence, ConsensusDecision, SynthesisStrategyTag};

use super::{average_pairwise_overlap, SynthesisConfig, SynthesisContext, SynthesisInput};

pub(super) async fn synthesize(
    input: &SynthesisInput<'_>,
    config: &SynthesisConfig,
    ctx: &SynthesisContext<'_>,
) -> Result<ConsensusDecision, CoreError> {
    if input.initial_responses.is_empty() {
        return Err(CoreError::SynthesisFailed(
            "no member responses to synthesize from".to_string(),
        ));
    }

    let normalized_weights = normalize_weights(config, input);

    let reducer_id = config
        .reducer_member_id
        .clone()
        .unwrap_or_else(|| input.initial_responses[0].council_member_id.clone());
    let reducer_member = input
        .members
        .iter()
        .find(|m| m.id == reducer_id)
        .ok_or_else(|| {
            CoreError::SynthesisFailed(format!("reducer member {reducer_id} not found in council"))
        })?;

    let prompt = build_weighted_prompt(input, &normalized_weights);
    let response = ctx
        .pool
        .send_request(reducer_member, &prompt, None)
        .await
        .map_err(|err| {
            CoreError::SynthesisFailed(format!("reducer call to {reducer_id} failed: {}", err.message))
        })?;
    ctx.metrics
        .record(&reducer_id, &reducer_member.model, &response.token_usage, response.latency_ms);

    let contents: Vec<&str> = input
        .initial_responses
        .iter()
        .map(|r| r.content.as_str())
        .collect();
    let agreement_level = average_pairwise_overlap(&contents);

    Ok(ConsensusDecision {
        content: response.content,
        confidence: Confidence::discretize(agreement_level),
        agreement_level,
        synthesis_strategy: SynthesisStrategyTag::WeightedFusion,
        contributing_members: input
            .initial_responses
            .iter()
            .map(|r| r.council_member_id.clone())
            .collect(),
        timestamp: Utc::now(),
        iterative_consensus_metadata: None,
    })
}

/// Normalizes `config.weights` to sum to 1 over the members that actually
/// responded. Members with no configured weight default to 0 and are
/// effectively down-weighted to silence, matching "∑w normalized to 1"
/// without inventing an opinion on missing weights.
fn normalize_weights(
    config: &SynthesisConfig,
    input: &SynthesisInput<'_>,
) -> Vec<(String, f64)> {
    let raw: Vec<(String, f64)> = input
        .initial_responses
        .iter()
        .map(|r| {
            let weight = config
                .weights
                .get(&r.council_member_id)
                .copied()
                .unwrap_or(0.0);
            (r.council_member_id.clone(), weight)
        })
        .collect();

    let total: f64 = raw.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        let even = 1.0 / raw.len().max(1) as f64;
        return raw.into_iter().map(|(id, _)| (id, even)).collect();
    }
    raw.into_iter().map(|(id, w)| (id, w / total)).collect()
}

fn build_weighted_prompt(input: &SynthesisInput<'_>, weights: &[(String, f64)]) -> String {
    let mut prompt = format!(
        "Original query: {}\n\nCouncil members responded independently, each with a weight reflecting their trust level:\n",
        input.request.query
    );
    for response in input.initial_responses {
        let weight = weights
            .iter()
            .find(|(id, _)| id == &response.council_member_id)
            .map(|(_, w)| *w)
            .unwrap_or(0.0);
        prompt.push_str(&format!(
            "\n[{} weight={:.3}]: {}\n",
            response.council_member_id, weight, response.content
        ));
    }
    prompt.push_str(
        "\nSynthesize a single consensus answer, weighting higher-weight members' opinions more heavily.",
    );
    prompt
}
