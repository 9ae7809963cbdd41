//! OpenAI-wire adapter (`POST /v1/chat/completions`). Speaks the
//! OpenAI-compatible chat-completions protocol directly.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::errors::ProviderError;
use crate::models::{CouncilMember, ErrorKind, TokenUsage};

use super::adapter::{AdapterFuture, ProviderAdapter, ProviderHealthProbe, ProviderResponse};
use super::http_support::{error_for_status, post_json};

#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn send_request<'a>(
        &'a self,
        member: &'a CouncilMember,
        prompt: &'a str,
        context: Option<&'a str>,
    ) -> AdapterFuture<'a> {
        Box::pin(async move {
            let mut messages = vec![json!({"role": "user", "content": prompt})];
            if let Some(ctx) = context {
                messages.insert(0, json!({"role": "system", "content": ctx}));
            }
            let body = json!({
                "model": member.model,
                "messages": messages,
                "temperature": 0,
            });

            let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
            let (status, body_text, latency_ms) = post_json(
                &self.client,
                &url,
                |b| b.bearer_auth(&self.api_key),
                &body,
            )
            .await?;

            if !status.is_success() {
                return Err(error_for_status(status, &body_text));
            }

            let parsed: OpenAiChatResponse = serde_json::from_str(&body_text)
                .map_err(|err| ProviderError::new(ErrorKind::UnknownError, format!("parse failure: {err}")))?;

            let content = parsed
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| ProviderError::new(ErrorKind::UnknownError, "missing choice"))?;

            let usage = parsed.usage.map(|usage| {
                TokenUsage::new(
                    usage.prompt_tokens.unwrap_or(0),
                    usage.completion_tokens.unwrap_or(0),
                )
            });

            Ok(ProviderResponse {
                content,
                token_usage: usage.unwrap_or_default(),
                latency_ms,
            })
        })
    }

    fn health<'a>(&'a self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ProviderHealthProbe> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/models", self.base_url.trim_end_matches('/'));
            let started = std::time::Instant::now();
            let result = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .timeout(Duration::from_secs(5))
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
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}
