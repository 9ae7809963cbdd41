//! Empty-context `SessionProvider` (SPEC_FULL.md §3: "returns empty context
//! for any session id"). A real deployment would back this with whatever
//! conversation store it already runs; the core never assumes one exists.

use std::future::Future;
use std::pin::Pin;

use council_core::collaborators::SessionProvider;

#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySessionProvider;

impl SessionProvider for EmptySessionProvider {
    fn context_for<'a>(
        &'a self,
        _session_id: &'a str,
        _token_budget: u32,
    ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
        Box::pin(async move { String::new() })
    }
}
