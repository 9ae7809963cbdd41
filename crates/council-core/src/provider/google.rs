//! Google Gemini adapter (`POST /v1beta/models/{model}:generateContent`).
//! Third distinct wire shape — the model name and API key travel in the
//! URL rather than the body or an auth header.

use serde::Deserialize;
use serde_json::json;

use crate::errors::ProviderError;
use crate::models::{CouncilMember, ErrorKind, TokenUsage};

use super::adapter::{AdapterFuture, ProviderAdapter, ProviderHealthProbe, ProviderResponse};
use super::http_support::{error_for_status, post_json};

#[derive(Debug, Clone)]
pub struct GoogleAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl ProviderAdapter for GoogleAdapter {
    fn send_request<'a>(
        &'a self,
        member: &'a CouncilMember,
        prompt: &'a str,
        context: Option<&'a str>,
    ) -> AdapterFuture<'a> {
        Box::pin(async move {
            let contents = vec![json!({"role": "user", "parts": [{"text": prompt}]})];
            let mut body = json!({ "contents": contents });
            if let Some(ctx) = context {
                body["systemInstruction"] = json!({"parts": [{"text": ctx}]});
            }

            let url = format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url.trim_end_matches('/'),
                member.model,
                self.api_key
            );
            let (status, body_text, latency_ms) =
                post_json(&self.client, &url, |b| b, &body).await?;

            if !status.is_success() {
                return Err(error_for_status(status, &body_text));
            }

            let parsed: GeminiResponse = serde_json::from_str(&body_text)
                .map_err(|err| ProviderError::new(ErrorKind::UnknownError, format!("parse failure: {err}")))?;

            let content = parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|candidate| candidate.content.parts.into_iter().next())
                .map(|part| part.text)
                .ok_or_else(|| ProviderError::new(ErrorKind::UnknownError, "missing candidate"))?;

            let usage = parsed
                .usage_metadata
                .map(|usage| {
                    TokenUsage::new(
                        usage.prompt_token_count.unwrap_or(0),
                        usage.candidates_token_count.unwrap_or(0),
                    )
                })
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
            let url = format!("{}/models?key={}", self.base_url.trim_end_matches('/'), self.api_key);
            let result = self
                .client
                .get(&url)
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
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}
