pub mod adapter;
pub mod anthropic;
pub mod google;
pub mod health;
mod http_support;
pub mod openai;
pub mod pool;
pub mod pricing;
pub mod xai;

pub use adapter::{AdapterFuture, ProviderAdapter, ProviderHealthProbe, ProviderResponse};
pub use anthropic::AnthropicAdapter;
pub use google::GoogleAdapter;
pub use health::{HealthTracker, HealthTrackerConfig};
pub use openai::OpenAiAdapter;
pub use pool::ProviderPool;
pub use xai::XaiAdapter;
