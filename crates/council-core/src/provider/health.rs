//! Health tracker: a circuit breaker, process-wide, shared between the
//! provider pool and the orchestrator. Generalized from one global breaker
//! to one row per provider id so contention stays local to a single
//! provider.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::models::{HealthStatus, ProviderHealth};

const MAX_SAMPLES: usize = 100;
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_DEGRADED_LATENCY_MS: f64 = 10_000.0;

#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    latency_ms: u64,
}

#[derive(Debug, Default)]
struct ProviderRow {
    samples: VecDeque<Outcome>,
    consecutive_failures: u32,
    status: RowStatus,
    disabled_reason: Option<String>,
    last_failure: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum RowStatus {
    #[default]
    Healthy,
    Degraded,
    Disabled,
}

impl ProviderRow {
    fn avg_latency_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: u64 = self.samples.iter().map(|o| o.latency_ms).sum();
        total as f64 / self.samples.len() as f64
    }

    fn success_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        let successes = self.samples.iter().filter(|o| o.success).count();
        successes as f64 / self.samples.len() as f64
    }

    fn push_sample(&mut self, outcome: Outcome) {
        self.samples.push_back(outcome);
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    fn to_health(&self, provider_id: &str) -> ProviderHealth {
        ProviderHealth {
            provider_id: provider_id.to_string(),
            status: match self.status {
                RowStatus::Healthy => HealthStatus::Healthy,
                RowStatus::Degraded => HealthStatus::Degraded,
                RowStatus::Disabled => HealthStatus::Disabled,
            },
            success_rate: self.success_rate(),
            avg_latency_ms: self.avg_latency_ms(),
            last_failure: self.last_failure,
            disabled_reason: self.disabled_reason.clone(),
        }
    }
}

/// Configurable thresholds — every numeric threshold here must be
/// configurable, never hardcoded.
#[derive(Debug, Clone, Copy)]
pub struct HealthTrackerConfig {
    pub failure_threshold: u32,
    pub degraded_latency_ms: f64,
}

impl Default for HealthTrackerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            degraded_latency_ms: DEFAULT_DEGRADED_LATENCY_MS,
        }
    }
}

#[derive(Clone)]
pub struct HealthTracker {
    config: HealthTrackerConfig,
    rows: Arc<RwLock<HashMap<String, Arc<Mutex<ProviderRow>>>>>,
}

impl HealthTracker {
    pub fn new(config: HealthTrackerConfig) -> Self {
        Self {
            config,
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn row_for(&self, provider_id: &str) -> Arc<Mutex<ProviderRow>> {
        if let Some(row) = self.rows.read().expect("health tracker lock poisoned").get(provider_id) {
            return row.clone();
        }
        let mut rows = self.rows.write().expect("health tracker lock poisoned");
        rows.entry(provider_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ProviderRow::default())))
            .clone()
    }

    pub fn record_success(&self, provider_id: &str, latency_ms: u64) {
        let row = self.row_for(provider_id);
        let mut row = row.lock().expect("provider row lock poisoned");
        row.consecutive_failures = 0;
        row.push_sample(Outcome {
            success: true,
            latency_ms,
        });
        if row.status == RowStatus::Degraded && row.avg_latency_ms() <= self.config.degraded_latency_ms {
            row.status = RowStatus::Healthy;
            row.disabled_reason = None;
        }
    }

    pub fn record_failure(&self, provider_id: &str, latency_ms: u64) {
        let row = self.row_for(provider_id);
        let mut row = row.lock().expect("provider row lock poisoned");
        row.consecutive_failures = row.consecutive_failures.saturating_add(1);
        row.push_sample(Outcome {
            success: false,
            latency_ms,
        });
        row.last_failure = Some(Utc::now());

        if row.consecutive_failures >= self.config.failure_threshold {
            row.status = RowStatus::Disabled;
            row.disabled_reason = Some(format!(
                "{} consecutive failures",
                row.consecutive_failures
            ));
        } else {
            row.status = RowStatus::Degraded;
        }

        if row.avg_latency_ms() > self.config.degraded_latency_ms && row.status == RowStatus::Healthy {
            row.status = RowStatus::Degraded;
        }
    }

    pub fn enable(&self, provider_id: &str) {
        let row = self.row_for(provider_id);
        let mut row = row.lock().expect("provider row lock poisoned");
        row.consecutive_failures = 0;
        row.status = RowStatus::Healthy;
        row.disabled_reason = None;
    }

    pub fn disable(&self, provider_id: &str, reason: impl Into<String>) {
        let row = self.row_for(provider_id);
        let mut row = row.lock().expect("provider row lock poisoned");
        row.status = RowStatus::Disabled;
        row.disabled_reason = Some(reason.into());
    }

    pub fn get(&self, provider_id: &str) -> ProviderHealth {
        let row = self.row_for(provider_id);
        let row = row.lock().expect("provider row lock poisoned");
        row.to_health(provider_id)
    }

    pub fn all(&self) -> Vec<ProviderHealth> {
        let rows = self.rows.read().expect("health tracker lock poisoned");
        rows.iter()
            .map(|(id, row)| row.lock().expect("provider row lock poisoned").to_health(id))
            .collect()
    }

    pub fn is_disabled(&self, provider_id: &str) -> bool {
        let row = self.row_for(provider_id);
        let row = row.lock().expect("provider row lock poisoned");
        row.status == RowStatus::Disabled
    }

    pub fn disabled_reason(&self, provider_id: &str) -> Option<String> {
        let row = self.row_for(provider_id);
        let row = row.lock().expect("provider row lock poisoned");
        row.disabled_reason.clone()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthTrackerConfig::default())
    }
}

/// Measures wall-clock elapsed for a single attempt, used by the pool to
/// report latency to the tracker regardless of success/failure.
pub(crate) fn elapsed_ms(started_at: Instant) -> u64 {
    u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disables_after_reaching_consecutive_failure_threshold() {
        let tracker = HealthTracker::new(HealthTrackerConfig {
            failure_threshold: 3,
            degraded_latency_ms: DEFAULT_DEGRADED_LATENCY_MS,
        });

        tracker.record_failure("p1", 100);
        assert_eq!(tracker.get("p1").status, HealthStatus::Degraded);
        tracker.record_failure("p1", 100);
        assert_eq!(tracker.get("p1").status, HealthStatus::Degraded);
        tracker.record_failure("p1", 100);
        assert_eq!(tracker.get("p1").status, HealthStatus::Disabled);
        assert!(tracker.is_disabled("p1"));
        assert!(tracker.disabled_reason("p1").is_some());
    }

    #[test]
    fn a_single_success_resets_the_consecutive_failure_counter() {
        let tracker = HealthTracker::new(HealthTrackerConfig {
            failure_threshold: 2,
            degraded_latency_ms: DEFAULT_DEGRADED_LATENCY_MS,
        });

        tracker.record_failure("p1", 100);
        tracker.record_success("p1", 50);
        tracker.record_failure("p1", 100);
        assert_eq!(
            tracker.get("p1").status,
            HealthStatus::Degraded,
            "counter should have reset after the intervening success, so one more failure must not disable"
        );
    }

    #[test]
    fn enable_clears_disabled_status_and_reason() {
        let tracker = HealthTracker::new(HealthTrackerConfig {
            failure_threshold: 1,
            degraded_latency_ms: DEFAULT_DEGRADED_LATENCY_MS,
        });

        tracker.record_failure("p1", 100);
        assert!(tracker.is_disabled("p1"));

        tracker.enable("p1");
        assert!(!tracker.is_disabled("p1"));
        assert!(tracker.disabled_reason("p1").is_none());
    }

    #[test]
    fn sample_window_is_capped_at_max_samples() {
        let tracker = HealthTracker::default();
        for _ in 0..(MAX_SAMPLES + 20) {
            tracker.record_success("p1", 10);
        }
        let row = tracker.row_for("p1");
        let row = row.lock().expect("lock");
        assert_eq!(row.samples.len(), MAX_SAMPLES);
    }

    #[test]
    fn manual_disable_carries_its_reason() {
        let tracker = HealthTracker::default();
        tracker.disable("p1", "maintenance window");
        assert_eq!(tracker.disabled_reason("p1"), Some("maintenance window".to_string()));
    }
}
