//! Anthropic Messages-API adapter (`POST /v1/messages`). Distinct request
//! and response shape from the OpenAI family: each adapter owns its own
//! translation to and from the provider's native wire payload, the pool and
//! health tracker never see the difference.

use serde::Deserialize;
use serde_json::json;

use crate::errors::ProviderError;
use crate::models::{CouncilMember, ErrorKind, TokenUsage};

use super::adapter::{AdapterFuture, ProviderAdapter, ProviderHealthProbe, ProviderResponse};
use super::http_support::{error_for_status, post_json};

#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn send_request<'a>(
        &'a self,
        member: &'a CouncilMember,
        prompt: &'a str,
        context: Option<&'a str>,
    ) -> AdapterFuture<'a> {
        Box::pin(async move {
            let mut body = json!({
                "model": member.model,
                "max_tokens": 4096,
                "messages": [{"role": "user", "content": prompt}],
            });
            if let Some(ctx) = context {
                body["system"] = json!(ctx);
            }

            let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
            let (status, body_text, latency_ms) = post_json(
                &self.client,
                &url,
                |b| {
                    b.header("x-api-key", &self.api_key)
                        .header("anthropic-version", "2023-06-01")
                },
                &body,
            )
            .await?;

            if !status.is_success() {
                return Err(error_for_status(status, &body_text));
            }

            let parsed: AnthropicMessageResponse = serde_json::from_str(&body_text)
                .map_err(|err| ProviderError::new(ErrorKind::UnknownError, format!("parse failure: {err}")))?;

            let content = parsed
                .content
                .into_iter()
                .find_map(|block| block.text)
                .ok_or_else(|| ProviderError::new(ErrorKind::UnknownError, "missing text block"))?;

            let usage = parsed
                .usage
                .map(|usage| TokenUsage::new(usage.input_tokens.unwrap_or(0), usage.output_tokens.unwrap_or(0)))
                .unwrap_or_default();

            Ok(ProviderResponse {
                content,
                token_usage: usage,
                latency_ms,
            })
        })
    }

    fn health<'a>(&'a self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ProviderHealthProbe> + Send + 'a>> {
        Box::pin(async move {
            let started = std::time::Instant::now();
            let result = self
                .client
                .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": "claude-3-5-haiku-20241022",
                    "max_tokens": 1,
                    "messages": [{"role": "user", "content": "ping"}],
                }))
                .timeout(std::time::Duration::from_secs(5))
                .send()
                .await;
            let latency_ms = u64::try_from(started.elapsed().as_millis()).ok();
            ProviderHealthProbe {
                available: result.map(|r| r.status().is_success()).unwrap_or(false),
                latency_ms,
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageResponse {
    content: Vec<AnthropicContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}
