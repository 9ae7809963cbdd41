//! xAI adapter. Grok's chat-completions endpoint is wire-compatible with
//! the OpenAI shape, so this wraps `OpenAiAdapter` against xAI's base URL
//! rather than re-deriving the same parsing — the adapter registry
//! (§4.1/§9) still exposes it as its own provider tag.

use crate::models::CouncilMember;

use super::adapter::{AdapterFuture, ProviderAdapter, ProviderHealthProbe};
use super::openai::OpenAiAdapter;

#[derive(Debug, Clone)]
pub struct XaiAdapter {
    inner: OpenAiAdapter,
}

impl XaiAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            inner: OpenAiAdapter::new(base_url, api_key),
        }
    }
}

impl ProviderAdapter for XaiAdapter {
    fn send_request<'a>(
        &'a self,
        member: &'a CouncilMember,
        prompt: &'a str,
        context: Option<&'a str>,
    ) -> AdapterFuture<'a> {
        self.inner.send_request(member, prompt, context)
    }

    fn health<'a>(&'a self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ProviderHealthProbe> + Send + 'a>> {
        self.inner.health()
    }
}
