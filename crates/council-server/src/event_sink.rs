//! Tracing-backed `EventSink`: logs every call via `tracing`, never fails.
//! One structured event per collaborator call, never a panic, never a
//! `Result`.

use council_core::collaborators::EventSink;
use council_core::models::{
    ConsensusDecision, DeliberationRound, InitialResponse, IterativeConsensusMetadata,
    NegotiationResponse, RequestMetrics,
};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn log_request(&self, request_id: uuid::Uuid, query: &str) {
        info!(request_id = %request_id, query_len = query.len(), "request received");
    }

    fn log_council_response(&self, request_id: uuid::Uuid, response: &InitialResponse) {
        info!(
            request_id = %request_id,
            member_id = %response.council_member_id,
            latency_ms = response.latency_ms,
            total_tokens = response.token_usage.total,
            "council member responded"
        );
    }

    fn log_deliberation_round(&self, request_id: uuid::Uuid, round: &DeliberationRound) {
        info!(
            request_id = %request_id,
            round_number = round.round_number,
            exchanges = round.exchanges.len(),
            "deliberation round complete"
        );
    }

    fn log_consensus_decision(&self, request_id: uuid::Uuid, decision: &ConsensusDecision) {
        info!(
            request_id = %request_id,
            strategy = ?decision.synthesis_strategy,
            confidence = ?decision.confidence,
            agreement_level = decision.agreement_level,
            contributing_members = decision.contributing_members.len(),
            "consensus decision reached"
        );
    }

    fn log_cost(&self, request_id: uuid::Uuid, metrics: &RequestMetrics) {
        info!(
            request_id = %request_id,
            total_tokens = metrics.total_tokens(),
            members = metrics.member_metrics.len(),
            "request cost recorded"
        );
    }

    fn log_provider_failure(&self, provider_id: &str, error: &str) {
        warn!(provider_id, error, "provider call failed");
    }

    fn log_negotiation_round(&self, request_id: uuid::Uuid, round_number: u32, responses: &[NegotiationResponse]) {
        info!(
            request_id = %request_id,
            round_number,
            responses = responses.len(),
            "negotiation round complete"
        );
    }

    fn log_negotiation_response(&self, request_id: uuid::Uuid, response: &NegotiationResponse) {
        info!(
            request_id = %request_id,
            member_id = %response.council_member_id,
            round_number = response.round_number,
            agrees_with = ?response.agrees_with_member_id,
            "negotiation response recorded"
        );
    }

    fn log_consensus_metadata(&self, request_id: uuid::Uuid, metadata: &IterativeConsensusMetadata) {
        info!(
            request_id = %request_id,
            total_rounds = metadata.total_rounds,
            consensus_achieved = metadata.consensus_achieved,
            fallback_used = metadata.fallback_used,
            deadlock_detected = metadata.deadlock_detected,
            human_escalation_triggered = metadata.human_escalation_triggered,
            "iterative consensus finished"
        );
    }
}
