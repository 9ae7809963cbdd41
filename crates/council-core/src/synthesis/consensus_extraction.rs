//! `consensus-extraction` strategy. Builds a reducer prompt from every
//! round-0 member's content and sends it through the provider pool to a
//! designated reducer member, defaulting to the first one.

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

    let prompt = build_reducer_prompt(input);
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
        synthesis_strategy: SynthesisStrategyTag::ConsensusExtraction,
        contributing_members: input
            .initial_responses
            .iter()
            .map(|r| r.council_member_id.clone())
            .collect(),
        timestamp: Utc::now(),
        iterative_consensus_metadata: None,
    })
}

fn build_reducer_prompt(input: &SynthesisInput<'_>) -> String {
    let mut prompt = format!(
        "Original query: {}\n\nThe following council members responded independently:\n",
        input.request.query
    );
    for response in input.initial_responses {
        prompt.push_str(&format!(
            "\n[{}]: {}\n",
            response.council_member_id, response.content
        ));
    }
    prompt.push_str(
        "\nSynthesize a single consensus answer that reflects the points of agreement above.",
    );
    prompt
}
