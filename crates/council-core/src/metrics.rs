//! Per-request metric accumulation shared between the orchestrator and the
//! synthesis engine, since both issue provider calls that must land in the
//! same `RequestMetrics`: every `TokenUsage` observed during a request
//! contributes to exactly one member entry. A `std::sync::Mutex` is
//! sufficient here — the critical section never spans an `.await` — the same
//! local-bookkeeping-accumulator shape used elsewhere for per-tick metrics,
//! generalized to a value shared across concurrent fan-out tasks.

use std::sync::Mutex;

use crate::models::{RequestMetrics, TokenUsage};
use crate::provider::pricing::estimate_cost_usd;

#[derive(Default)]
pub struct MetricsSink {
    inner: Mutex<RequestMetrics>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one provider call's outcome against `member_id`, pricing it
    /// via the member's model name. Safe to call concurrently from parallel
    /// fan-out tasks (round-0, deliberation, negotiation, or a synthesis
    /// reducer call) — every one of those must be attributed.
    pub fn record(&self, member_id: &str, model: &str, usage: &TokenUsage, latency_ms: u64) {
        let cost = estimate_cost_usd(model, usage.prompt, usage.completion);
        self.inner
            .lock()
            .expect("metrics sink lock poisoned")
            .record(member_id, usage, latency_ms, cost);
    }

    pub fn snapshot(&self) -> RequestMetrics {
        self.inner.lock().expect("metrics sink lock poisoned").clone()
    }

    pub fn into_inner(self) -> RequestMetrics {
        self.inner.into_inner().expect("metrics sink lock poisoned")
    }
}
