//! `meta-synthesis` strategy. Selects a moderator member by
//! `moderatorStrategy` and asks it to produce the final answer given its
//! peers' contents.

use chrono::Utc;

use crate::models::{Confidence, ConsensusDecision, CouncilMember, InitialResponse, SynthesisStrategyTag};
use crate::errors::CoreError;

use super::{average_pairwise_overlap, ModeratorStrategy, SynthesisConfig, SynthesisContext, SynthesisInput};

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

    let moderator_id = select_moderator(config, input, ctx);
    let moderator_member = input
        .members
        .iter()
        .find(|m| m.id == moderator_id)
        .ok_or_else(|| {
            CoreError::SynthesisFailed(format!("moderator {moderator_id} not found in council"))
        })?;

    let prompt = build_moderator_prompt(input, &moderator_id);
    let response = ctx
        .pool
        .send_request(moderator_member, &prompt, None)
        .await
        .map_err(|err| {
            CoreError::SynthesisFailed(format!("moderator call to {moderator_id} failed: {}", err.message))
        })?;
    ctx.metrics.record(
        &moderator_id,
        &moderator_member.model,
        &response.token_usage,
        response.latency_ms,
    );

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
        synthesis_strategy: SynthesisStrategyTag::MetaSynthesis,
        contributing_members: input
            .initial_responses
            .iter()
            .map(|r| r.council_member_id.clone())
            .collect(),
        timestamp: Utc::now(),
        iterative_consensus_metadata: None,
    })
}

fn select_moderator(
    config: &SynthesisConfig,
    input: &SynthesisInput<'_>,
    ctx: &SynthesisContext<'_>,
) -> String {
    match &config.moderator_strategy {
        ModeratorStrategy::Permanent(member_id) => member_id.clone(),
        ModeratorStrategy::Rotate => rotate_moderator(input.request.id, input.members),
        ModeratorStrategy::Strongest => strongest_moderator(input.members, ctx),
    }
}

/// Round-robin by request-id hash. Deterministic for a given request id and
/// member set.
fn rotate_moderator(request_id: uuid::Uuid, members: &[CouncilMember]) -> String {
    if members.is_empty() {
        return String::new();
    }
    let hash = request_id.as_u128();
    let index = (hash % members.len() as u128) as usize;
    members[index].id.clone()
}

fn strongest_moderator(members: &[CouncilMember], ctx: &SynthesisContext<'_>) -> String {
    members
        .iter()
        .max_by(|a, b| {
            let a_rate = ctx.health.get(&a.id).success_rate;
            let b_rate = ctx.health.get(&b.id).success_rate;
            a_rate
                .partial_cmp(&b_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|m| m.id.clone())
        .unwrap_or_default()
}

fn build_moderator_prompt(input: &SynthesisInput<'_>, moderator_id: &str) -> String {
    let peers: Vec<&InitialResponse> = input
        .initial_responses
        .iter()
        .filter(|r| r.council_member_id != moderator_id)
        .collect();

    let mut prompt = format!(
        "Original query: {}\n\nYou are the moderator. Your peers responded:\n",
        input.request.query
    );
    for peer in &peers {
        prompt.push_str(&format!("\n[{}]: {}\n", peer.council_member_id, peer.content));
    }
    prompt.push_str("\nProduce the final consensus answer, drawing on your peers' input where it strengthens your own.");
    prompt
}
