//! Orchestration engine. Drives the full request lifecycle: config
//! snapshot, global deadline, round-0 fan-out, the minimum-size gate,
//! deliberation or iterative-consensus, synthesis, and metric attribution.
//! Grounded in the same shape used elsewhere for "claim a batch of
//! work and drive it to completion": a runtime struct bundling the
//! request's collaborators, one fan-out per unit of work, and a tracing
//! span carrying the aggregate outcome — generalized here from "claim and
//! run due jobs" to "fan a query out to the council and drive it to a
//! consensus decision".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};

use crate::collaborators::{
    ConfigurationProvider, DeliberationConfig, Embedder, EventSink, ExampleRepository,
    SessionProvider,
};
use crate::errors::CoreError;
use crate::metrics::MetricsSink;
use crate::models::{
    CouncilMember, DeliberationExchange, DeliberationRound, DeliberationThread, InitialResponse,
    ProcessRequestResult, ProviderHealth, SynthesisStrategyTag, UserRequest,
};
use crate::provider::{HealthTracker, ProviderPool};
use crate::synthesis::{self, SynthesisContext, SynthesisInput};

/// Token budget handed to `SessionProvider::context_for` when a request
/// carries a `sessionId`. Not a config knob — a constant the core picks for
/// itself, the way prompt-shaping constants elsewhere are hardcoded rather
/// than threaded through config.
const SESSION_CONTEXT_TOKEN_BUDGET: u32 = 2048;

/// Process-wide handle: owns the provider pool and health tracker (created
/// at startup, destroyed at shutdown) plus the injected collaborators.
/// Cheap to clone (the pool and health tracker are themselves `Arc`-backed);
/// `council-server` clones one into every request handler rather than
/// wrapping the whole thing in an `Arc`.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<dyn ConfigurationProvider>,
    pool: ProviderPool,
    health: HealthTracker,
    events: Arc<dyn EventSink>,
    embedder: Arc<dyn Embedder>,
    examples: Arc<dyn ExampleRepository>,
    sessions: Arc<dyn SessionProvider>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<dyn ConfigurationProvider>,
        pool: ProviderPool,
        health: HealthTracker,
        events: Arc<dyn EventSink>,
        embedder: Arc<dyn Embedder>,
        examples: Arc<dyn ExampleRepository>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            config,
            pool,
            health,
            events,
            embedder,
            examples,
            sessions,
        }
    }

    /// §6's `providerHealth()` surface.
    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.health.all()
    }

    /// §6's `enableProvider(id)` surface.
    pub fn enable_provider(&self, provider_id: &str) {
        self.health.enable(provider_id);
    }

    /// §6's `disableProvider(id, reason)` surface.
    pub fn disable_provider(&self, provider_id: &str, reason: impl Into<String>) {
        self.health.disable(provider_id, reason);
    }

    /// §6's `processRequest(UserRequest) -> ProcessRequestResult` surface.
    pub async fn process_request(
        &self,
        request: &UserRequest,
    ) -> Result<ProcessRequestResult, CoreError> {
        let span = info_span!("process_request", request_id = %request.id);
        self.process_request_inner(request).instrument(span).await
    }

    async fn process_request_inner(
        &self,
        request: &UserRequest,
    ) -> Result<ProcessRequestResult, CoreError> {
        self.events.log_request(request.id, &request.query);

        let snapshot = self.config.snapshot();
        let global_deadline =
            Instant::now() + Duration::from_secs(snapshot.performance.global_timeout_seconds);
        let members = &snapshot.council.members;

        let context = self.resolve_context(request).await;
        let metrics = MetricsSink::new();

        let mut initial_responses = self
            .fan_out_round_zero(members, request, context.as_deref(), global_deadline, &metrics)
            .await;
        initial_responses.sort_by(|a, b| a.council_member_id.cmp(&b.council_member_id));

        for response in &initial_responses {
            self.events.log_council_response(request.id, response);
        }

        if initial_responses.is_empty() {
            if Instant::now() >= global_deadline {
                return Err(CoreError::GlobalDeadlineExceeded {
                    elapsed_ms: snapshot.performance.global_timeout_seconds.saturating_mul(1000),
                });
            }
            return Err(CoreError::InsufficientMembers {
                successful: 0,
                required: snapshot.council.minimum_size.max(1),
            });
        }

        // The minimum-size gate is a round-0 gate only, evaluated once here
        // regardless of synthesis strategy (see DESIGN.md).
        if snapshot.council.require_minimum_for_consensus
            && initial_responses.len() < snapshot.council.minimum_size
        {
            return Err(CoreError::InsufficientMembers {
                successful: initial_responses.len(),
                required: snapshot.council.minimum_size,
            });
        }

        let is_iterative = snapshot.synthesis.strategy == SynthesisStrategyTag::IterativeConsensus;
        let deliberation_thread = if !is_iterative && snapshot.deliberation.rounds > 0 {
            Some(
                self.run_deliberation(
                    &snapshot.deliberation,
                    request,
                    members,
                    &initial_responses,
                    context.as_deref(),
                    global_deadline,
                    &metrics,
                )
                .await,
            )
        } else {
            None
        };

        let synthesis_ctx = SynthesisContext {
            pool: &self.pool,
            health: &self.health,
            embedder: self.embedder.as_ref(),
            examples: self.examples.as_ref(),
            events: self.events.as_ref(),
            metrics: &metrics,
            request_id: request.id,
        };
        let synthesis_input = SynthesisInput {
            request,
            members,
            initial_responses: &initial_responses,
            deliberation: deliberation_thread.as_ref(),
        };

        let decision =
            synthesis::synthesize(synthesis_input, &snapshot.synthesis, &synthesis_ctx).await?;
        self.events.log_consensus_decision(request.id, &decision);

        let metrics = metrics.snapshot();
        self.events.log_cost(request.id, &metrics);

        info!(
            strategy = ?decision.synthesis_strategy,
            responding_members = initial_responses.len(),
            deliberation_rounds = deliberation_thread.as_ref().map(|t| t.rounds.len()).unwrap_or(0),
            total_tokens = metrics.total_tokens(),
            confidence = ?decision.confidence,
            "processRequest complete"
        );

        Ok(ProcessRequestResult {
            consensus_decision: decision,
            metrics,
        })
    }

    async fn resolve_context(&self, request: &UserRequest) -> Option<String> {
        let session_context = match &request.session_id {
            Some(session_id) => {
                let ctx = self
                    .sessions
                    .context_for(session_id, SESSION_CONTEXT_TOKEN_BUDGET)
                    .await;
                if ctx.is_empty() {
                    None
                } else {
                    Some(ctx)
                }
            }
            None => None,
        };

        match (session_context, &request.context) {
            (Some(session_ctx), Some(request_ctx)) => {
                Some(format!("{session_ctx}\n\n{request_ctx}"))
            }
            (Some(session_ctx), None) => Some(session_ctx),
            (None, Some(request_ctx)) => Some(request_ctx.clone()),
            (None, None) => None,
        }
    }

    /// One task per live member, each additionally bound by the global
    /// deadline. `member.timeout` already bounds every individual attempt
    /// inside `ProviderPool::send_request`; this outer wrap only needs to
    /// cut the whole call (attempts and backoff sleeps included) short if
    /// the global deadline runs out first — it must not re-cap the call at
    /// a single attempt's duration, or a member's configured retries would
    /// never get to run. A member that fails or exceeds the deadline simply
    /// produces no `InitialResponse` — never a request failure.
    async fn fan_out_round_zero(
        &self,
        members: &[CouncilMember],
        request: &UserRequest,
        context: Option<&str>,
        global_deadline: Instant,
        metrics: &MetricsSink,
    ) -> Vec<InitialResponse> {
        let prompt = request.query.as_str();
        let mut tasks = Vec::new();
        for member in members {
            if self.health.is_disabled(&member.id) {
                continue;
            }
            let remaining = global_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                continue;
            }
            tasks.push(async move {
                let result = tokio::time::timeout(
                    remaining,
                    self.pool.send_request(member, prompt, context),
                )
                .await;
                (member, result)
            });
        }

        let results = futures::future::join_all(tasks).await;
        let mut responses = Vec::with_capacity(results.len());
        for (member, result) in results {
            match result {
                Ok(Ok(response)) => {
                    metrics.record(&member.id, &member.model, &response.token_usage, response.latency_ms);
                    responses.push(InitialResponse {
                        council_member_id: member.id.clone(),
                        content: response.content,
                        token_usage: response.token_usage,
                        latency_ms: response.latency_ms,
                        timestamp: Utc::now(),
                    });
                }
                Ok(Err(err)) => {
                    warn!(member_id = %member.id, error = %err, "round-0 call failed");
                    self.events.log_provider_failure(&member.id, &err.message);
                }
                Err(_elapsed) => {
                    warn!(member_id = %member.id, "round-0 call exceeded the global deadline");
                    self.events
                        .log_provider_failure(&member.id, "round-0 call exceeded the global deadline");
                }
            }
        }
        responses
    }

    /// K rounds of deliberation, each prompting every live member with peer
    /// round-(k-1) responses and their own prior response. A member disabled
    /// mid-request is dropped at the next round boundary, never mid-flight.
    #[allow(clippy::too_many_arguments)]
    async fn run_deliberation(
        &self,
        deliberation: &DeliberationConfig,
        request: &UserRequest,
        members: &[CouncilMember],
        initial_responses: &[InitialResponse],
        context: Option<&str>,
        global_deadline: Instant,
        metrics: &MetricsSink,
    ) -> DeliberationThread {
        let member_by_id: HashMap<&str, &CouncilMember> =
            members.iter().map(|m| (m.id.as_str(), m)).collect();
        let mut last_content: HashMap<String, String> = initial_responses
            .iter()
            .map(|r| (r.council_member_id.clone(), r.content.clone()))
            .collect();
        let mut live: Vec<String> = initial_responses
            .iter()
            .map(|r| r.council_member_id.clone())
            .collect();
        live.sort();

        let mut thread = DeliberationThread::default();

        for round_number in 1..=deliberation.rounds {
            if Instant::now() >= global_deadline {
                break;
            }
            live.retain(|id| !self.health.is_disabled(id));
            if live.len() < 2 {
                break;
            }

            let remaining = global_deadline.saturating_duration_since(Instant::now());
            let mut tasks = Vec::new();
            for member_id in &live {
                let Some(member) = member_by_id.get(member_id.as_str()).copied() else {
                    continue;
                };
                let own_previous = last_content.get(member_id).cloned().unwrap_or_default();
                let peers: Vec<(String, String)> = live
                    .iter()
                    .filter(|id| *id != member_id)
                    .map(|id| (id.clone(), last_content.get(id).cloned().unwrap_or_default()))
                    .collect();
                let prompt = deliberation_prompt(&request.query, &own_previous, &peers);
                tasks.push(async move {
                    let result = tokio::time::timeout(
                        remaining,
                        self.pool.send_request(member, &prompt, context),
                    )
                    .await;
                    (member_id.clone(), member, result)
                });
            }

            let results = futures::future::join_all(tasks).await;
            let mut exchanges = Vec::new();
            let mut refreshed_content = Vec::new();
            for (member_id, member, result) in results {
                match result {
                    Ok(Ok(response)) => {
                        metrics.record(&member_id, &member.model, &response.token_usage, response.latency_ms);
                        let peer_ids: Vec<String> =
                            live.iter().filter(|id| **id != member_id).cloned().collect();
                        let (references_to, content) =
                            parse_deliberation_reply(&response.content, &peer_ids);
                        refreshed_content.push((member_id.clone(), content.clone()));
                        exchanges.push(DeliberationExchange {
                            council_member_id: member_id,
                            content,
                            references_to,
                            token_usage: response.token_usage,
                        });
                    }
                    Ok(Err(err)) => {
                        self.events.log_provider_failure(&member_id, &err.message);
                    }
                    Err(_elapsed) => {
                        self.events
                            .log_provider_failure(&member_id, "deliberation round exceeded the global deadline");
                    }
                }
            }

            if exchanges.is_empty() {
                break;
            }

            for (id, content) in refreshed_content {
                last_content.insert(id, content);
            }

            let round = DeliberationRound {
                round_number,
                exchanges,
            };
            self.events.log_deliberation_round(request.id, &round);
            thread.rounds.push(round);
        }

        thread
    }
}

fn deliberation_prompt(query: &str, own_previous: &str, peers_previous: &[(String, String)]) -> String {
    let mut prompt = format!(
        "Original query: {query}\n\nYour previous response:\n{own_previous}\n\nPeers' previous responses:\n"
    );
    for (peer_id, content) in peers_previous {
        prompt.push_str(&format!("\n[{peer_id}]: {content}\n"));
    }
    prompt.push_str(
        "\nCritique or refine your answer in light of your peers. Start your reply with a line \
         \"REFS: <comma-separated member ids you are responding to>\", then your refined answer \
         on the following lines.",
    );
    prompt
}

/// Parses the `REFS:` convention above. `referencesTo` must be non-empty —
/// each exchange must cite at least one prior round-0 member — so if the
/// member's reply doesn't follow the convention, every other live member is
/// cited, which is always true in spirit since the prompt showed all of
/// them.
fn parse_deliberation_reply(raw: &str, peer_ids: &[String]) -> (Vec<String>, String) {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix("REFS:") {
        if let Some((refs_line, body)) = rest.split_once('\n') {
            let refs: Vec<String> = refs_line
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && peer_ids.contains(s))
                .collect();
            if !refs.is_empty() {
                return (refs, body.trim().to_string());
            }
        }
    }
    (peer_ids.to_vec(), raw.trim().to_string())
}
