//! Provider pool. Single entry point that resolves an adapter, consults the
//! health tracker, and drives retry/backoff/timeout — the only component
//! allowed to retry. The attempt loop generalizes a retry-across-candidates
//! shape used elsewhere, from "retry across two hardcoded models" to "retry
//! one member under a configurable policy", and keeps the same
//! before/after health-tracker bookkeeping around each logical call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::sleep;

use crate::errors::ProviderError;
use crate::models::{CouncilMember, ErrorKind, ProviderTag};

use super::adapter::{ProviderAdapter, ProviderResponse};
use super::health::{elapsed_ms, HealthTracker};

#[derive(Clone)]
pub struct ProviderPool {
    adapters: HashMap<ProviderTag, Arc<dyn ProviderAdapter>>,
    health: HealthTracker,
}

impl ProviderPool {
    pub fn new(health: HealthTracker) -> Self {
        Self {
            adapters: HashMap::new(),
            health,
        }
    }

    pub fn register(&mut self, tag: ProviderTag, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(tag, adapter);
    }

    pub fn health_tracker(&self) -> &HealthTracker {
        &self.health
    }

    /// Exactly one health tracker update happens per invocation, regardless
    /// of retry count — the key invariant this pool exists to uphold.
    pub async fn send_request(
        &self,
        member: &CouncilMember,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let Some(adapter) = self.adapters.get(&member.provider) else {
            return Err(ProviderError::new(
                ErrorKind::ProviderNotConfigured,
                format!("provider not configured for member {}", member.id),
            ));
        };

        if self.health.is_disabled(&member.id) {
            let reason = self
                .health
                .disabled_reason(&member.id)
                .unwrap_or_else(|| "unknown reason".to_string());
            return Err(ProviderError::new(
                ErrorKind::ProviderDisabled,
                format!("provider {} is disabled: {reason}", member.id),
            ));
        }

        let call_started_at = Instant::now();
        let policy = &member.retry_policy;
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..policy.max_attempts {
            let attempt_result =
                tokio::time::timeout(member.timeout(), adapter.send_request(member, prompt, context)).await;

            match attempt_result {
                Ok(Ok(response)) => {
                    self.health.record_success(&member.id, response.latency_ms);
                    return Ok(response);
                }
                Ok(Err(err)) => {
                    let retryable = policy.is_retryable(err.kind);
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                }
                Err(_elapsed) => {
                    // Per-attempt deadline fired; the in-flight adapter call is
                    // dropped here (its future is never polled again) and its
                    // result discarded, satisfying the cancel-on-timeout rule.
                    let timeout_error = ProviderError::new(ErrorKind::Timeout, "adapter call exceeded member timeout");
                    let retryable = policy.is_retryable(ErrorKind::Timeout);
                    last_error = Some(timeout_error);
                    if !retryable {
                        break;
                    }
                }
            }

            if attempt < policy.max_attempts - 1 {
                sleep(policy.delay_for_attempt(attempt)).await;
            }
        }

        let wallclock_latency_ms = elapsed_ms(call_started_at);
        self.health.record_failure(&member.id, wallclock_latency_ms);

        Err(last_error.unwrap_or_else(|| {
            ProviderError::new(ErrorKind::UnknownError, "no attempts were made")
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;
    use tokio::time::{self, Instant as TokioInstant};

    use crate::models::{RetryPolicy, TokenUsage};

    use super::super::adapter::{AdapterFuture, ProviderHealthProbe};
    use super::*;

    #[derive(Clone)]
    struct StubAdapter {
        responses: Arc<Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>>,
        call_count: Arc<Mutex<u32>>,
        delay: Option<Duration>,
    }

    impl StubAdapter {
        fn with_responses(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(VecDeque::from(responses))),
                call_count: Arc::new(Mutex::new(0)),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        async fn calls(&self) -> u32 {
            *self.call_count.lock().await
        }
    }

    impl ProviderAdapter for StubAdapter {
        fn send_request<'a>(
            &'a self,
            _member: &'a CouncilMember,
            _prompt: &'a str,
            _context: Option<&'a str>,
        ) -> AdapterFuture<'a> {
            Box::pin(async move {
                *self.call_count.lock().await += 1;
                if let Some(delay) = self.delay {
                    time::sleep(delay).await;
                }
                self.responses
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or_else(|| Err(ProviderError::new(ErrorKind::UnknownError, "no stub response queued")))
            })
        }

        fn health<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = ProviderHealthProbe> + Send + 'a>> {
            Box::pin(async move {
                ProviderHealthProbe {
                    available: true,
                    latency_ms: Some(0),
                }
            })
        }
    }

    fn member_with_policy(policy: RetryPolicy) -> CouncilMember {
        CouncilMember {
            id: "member-a".to_string(),
            provider: ProviderTag::OpenAi,
            model: "stub-model".to_string(),
            timeout_seconds: 5,
            retry_policy: policy,
            weight: None,
        }
    }

    fn ok_response(total: u32) -> ProviderResponse {
        ProviderResponse {
            content: "answer".to_string(),
            token_usage: TokenUsage::new(total / 2, total - total / 2),
            latency_ms: 10,
        }
    }

    fn retryable_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 1.0,
            retryable_errors: vec![ErrorKind::ServiceUnavailable, ErrorKind::Timeout],
        }
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts_on_retryable_errors() {
        let adapter = StubAdapter::with_responses(vec![
            Err(ProviderError::new(ErrorKind::ServiceUnavailable, "down")),
            Err(ProviderError::new(ErrorKind::ServiceUnavailable, "down")),
            Ok(ok_response(10)),
        ]);
        let mut pool = ProviderPool::new(HealthTracker::default());
        pool.register(ProviderTag::OpenAi, Arc::new(adapter.clone()));

        let member = member_with_policy(retryable_policy(3));
        let result = pool.send_request(&member, "hello", None).await;

        assert!(result.is_ok(), "third attempt should succeed");
        assert_eq!(adapter.calls().await, 3, "should have retried twice before succeeding");
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let adapter = StubAdapter::with_responses(vec![
            Err(ProviderError::new(ErrorKind::AuthenticationError, "bad key")),
            Ok(ok_response(10)),
        ]);
        let mut pool = ProviderPool::new(HealthTracker::default());
        pool.register(ProviderTag::OpenAi, Arc::new(adapter.clone()));

        let member = member_with_policy(retryable_policy(3));
        let result = pool.send_request(&member, "hello", None).await;

        assert!(result.is_err(), "non-retryable error should fail fast");
        assert_eq!(adapter.calls().await, 1, "should not have retried after an auth error");
    }

    #[tokio::test(start_paused = true)]
    async fn per_attempt_timeout_is_bounded_by_member_timeout() {
        let adapter = StubAdapter::with_responses(vec![Ok(ok_response(10))]).with_delay(Duration::from_secs(10));
        let mut pool = ProviderPool::new(HealthTracker::default());
        pool.register(ProviderTag::OpenAi, Arc::new(adapter.clone()));

        let mut member = member_with_policy(retryable_policy(1));
        member.timeout_seconds = 1;

        let started = TokioInstant::now();
        let result = pool.send_request(&member, "hello", None).await;
        let elapsed = started.elapsed();

        assert!(result.is_err(), "call exceeding member timeout should fail");
        assert!(elapsed < Duration::from_secs(2), "timeout should fire around the member's own bound, not wait for the full delay");
    }

    #[tokio::test]
    async fn records_exactly_one_health_outcome_per_logical_call_regardless_of_retries() {
        let adapter = StubAdapter::with_responses(vec![
            Err(ProviderError::new(ErrorKind::ServiceUnavailable, "down")),
            Err(ProviderError::new(ErrorKind::ServiceUnavailable, "down")),
            Ok(ok_response(10)),
        ]);
        let health = HealthTracker::default();
        let mut pool = ProviderPool::new(health.clone());
        pool.register(ProviderTag::OpenAi, Arc::new(adapter));

        let member = member_with_policy(retryable_policy(3));
        pool.send_request(&member, "hello", None).await.expect("should eventually succeed");

        let snapshot = health.get(&member.id);
        assert_eq!(snapshot.success_rate, 1.0, "the one recorded outcome should be the final success");
    }

    #[tokio::test]
    async fn disabled_provider_short_circuits_without_calling_adapter() {
        let adapter = StubAdapter::with_responses(vec![Ok(ok_response(10))]);
        let health = HealthTracker::default();
        let mut pool = ProviderPool::new(health.clone());
        pool.register(ProviderTag::OpenAi, Arc::new(adapter.clone()));

        let member = member_with_policy(retryable_policy(3));
        health.disable(&member.id, "maintenance");

        let result = pool.send_request(&member, "hello", None).await;

        assert!(matches!(result, Err(err) if err.kind == ErrorKind::ProviderDisabled));
        assert_eq!(adapter.calls().await, 0, "a disabled provider must never reach the adapter");
    }
}
