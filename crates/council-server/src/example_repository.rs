//! Empty `ExampleRepository` (SPEC_FULL.md §3: "returns an empty list").
//! §6.4 explicitly tolerates this — `k` negotiation examples are an
//! optimization hint, not a correctness requirement.

use std::future::Future;
use std::pin::Pin;

use council_core::collaborators::{ExampleRepository, NegotiationExample};

#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyExampleRepository;

impl ExampleRepository for EmptyExampleRepository {
    fn relevant<'a>(
        &'a self,
        _query: &'a str,
        _k: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<NegotiationExample>> + Send + 'a>> {
        Box::pin(async move { Vec::new() })
    }
}
