//! Provider adapter. One adapter per provider tag, behind a small
//! capability set rather than an inheritance hierarchy.

use std::future::Future;
use std::pin::Pin;

use crate::errors::ProviderError;
use crate::models::{CouncilMember, TokenUsage};

pub type AdapterFuture<'a> = Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ProviderHealthProbe {
    pub available: bool,
    pub latency_ms: Option<u64>,
}

/// Adapters MUST NOT retry internally — retry is the provider pool's
/// responsibility, so the health tracker sees exactly one logical call per
/// attempt.
pub trait ProviderAdapter: Send + Sync {
    fn send_request<'a>(
        &'a self,
        member: &'a CouncilMember,
        prompt: &'a str,
        context: Option<&'a str>,
    ) -> AdapterFuture<'a>;

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = ProviderHealthProbe> + Send + 'a>>;
}
