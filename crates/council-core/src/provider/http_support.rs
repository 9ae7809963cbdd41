//! Shared plumbing for the HTTP-backed adapters (`openai.rs`, `anthropic.rs`,
//! `google.rs`, `xai.rs`): build a JSON body, POST it, read the status and
//! body, classify failures before anything reaches the pool.

use std::time::Instant;

use reqwest::StatusCode;

use crate::errors::{classify_http_status, ProviderError};
use crate::models::ErrorKind;

/// Performs one HTTP POST and returns the raw status + body text, or a
/// `ProviderError` for network-layer failures (before headers arrived).
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<(StatusCode, String, u64), ProviderError> {
    let started_at = Instant::now();
    let builder = headers(client.post(url)).json(body);

    let response = builder.send().await.map_err(|err| {
        if err.is_timeout() {
            ProviderError::new(ErrorKind::Timeout, "request timed out before headers")
        } else {
            ProviderError::new(ErrorKind::NetworkError, err.to_string())
        }
    })?;

    let status = response.status();
    let body_text = response.text().await.map_err(|err| {
        ProviderError::new(ErrorKind::NetworkError, format!("body read failed: {err}"))
    })?;
    let latency_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

    Ok((status, body_text, latency_ms))
}

/// Raises a non-2xx status into a classified `ProviderError` using the
/// shared status-code rule table.
pub(crate) fn error_for_status(status: StatusCode, body: &str) -> ProviderError {
    let kind = classify_http_status(status.as_u16(), body);
    ProviderError::new(kind, format!("status={} body={}", status.as_u16(), truncate(body, 200)))
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
