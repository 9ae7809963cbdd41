//! Static, env-seeded `ConfigurationProvider`, immutable after boot.
//! Follows the established `from_env` pattern: parse-or-default helpers
//! feeding an owned struct, a `ConfigError` via `thiserror`.

use std::collections::HashMap;
use std::env;

use council_core::collaborators::{CouncilConfig, DeliberationConfig, PerformanceConfig};
use council_core::models::{CouncilMember, ErrorKind, ProviderTag, RetryPolicy, SynthesisStrategyTag};
use council_core::synthesis::{
    FallbackStrategy, IterativeConsensusConfig, ModeratorStrategy, NegotiationMode, SynthesisConfig,
};
use council_core::ConfigurationProvider;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid float in env var {0}")]
    ParseFloat(String),
    #[error("{0} requires at least one COUNCIL_MEMBER_n_* triple (id/provider/model)")]
    NoMembers(&'static str),
    #[error("unknown provider tag {0:?} for council member {1}")]
    UnknownProvider(String, String),
}

/// Env-seeded snapshot. Read once at startup; `ConfigurationProvider::snapshot`
/// then clones from this in-memory copy for every request, without
/// re-reading the environment on every call.
pub struct StaticConfigurationProvider {
    council: CouncilConfig,
    deliberation: DeliberationConfig,
    synthesis: SynthesisConfig,
    performance: PerformanceConfig,
}

impl StaticConfigurationProvider {
    pub fn from_env() -> Result<Self, ConfigError> {
        let members = council_members_from_env()?;
        let minimum_size = parse_usize_env("COUNCIL_MINIMUM_SIZE", members.len().min(2).max(1))?;

        Ok(Self {
            council: CouncilConfig {
                members,
                require_minimum_for_consensus: parse_bool_env(
                    "COUNCIL_REQUIRE_MINIMUM_FOR_CONSENSUS",
                    true,
                ),
                minimum_size,
            },
            deliberation: DeliberationConfig {
                rounds: parse_u32_env("DELIBERATION_ROUNDS", 0)?,
            },
            synthesis: synthesis_config_from_env()?,
            performance: PerformanceConfig {
                global_timeout_seconds: parse_u64_env("GLOBAL_TIMEOUT_SECONDS", 60)?,
                enable_fast_fallback: parse_bool_env("ENABLE_FAST_FALLBACK", true),
                streaming_enabled: parse_bool_env("STREAMING_ENABLED", false),
            },
        })
    }
}

impl ConfigurationProvider for StaticConfigurationProvider {
    fn council_config(&self) -> CouncilConfig {
        self.council.clone()
    }

    fn deliberation_config(&self) -> DeliberationConfig {
        self.deliberation.clone()
    }

    fn synthesis_config(&self) -> SynthesisConfig {
        self.synthesis.clone()
    }

    fn performance_config(&self) -> PerformanceConfig {
        self.performance.clone()
    }
}

/// Reads `COUNCIL_MEMBER_{n}_ID` / `_PROVIDER` / `_MODEL` / `_API_KEY` /
/// `_BASE_URL` triples for `n` starting at 1 until one is missing. Follows
/// the same numbered-env-var convention used elsewhere for small
/// enumerable config lists, extended here to an unbounded list.
fn council_members_from_env() -> Result<Vec<CouncilMember>, ConfigError> {
    let mut members = Vec::new();
    let mut n = 1;
    loop {
        let Ok(id) = env::var(format!("COUNCIL_MEMBER_{n}_ID")) else {
            break;
        };
        let provider_raw = env::var(format!("COUNCIL_MEMBER_{n}_PROVIDER"))
            .unwrap_or_else(|_| "openai".to_string());
        let provider = parse_provider_tag(&provider_raw, &id)?;
        let model = env::var(format!("COUNCIL_MEMBER_{n}_MODEL"))
            .unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let timeout_seconds = parse_u64_env(&format!("COUNCIL_MEMBER_{n}_TIMEOUT_SECONDS"), 30)?;
        let weight = env::var(format!("COUNCIL_MEMBER_{n}_WEIGHT"))
            .ok()
            .map(|raw| {
                raw.parse::<f64>()
                    .map_err(|_| ConfigError::ParseFloat(format!("COUNCIL_MEMBER_{n}_WEIGHT")))
            })
            .transpose()?;

        members.push(CouncilMember {
            id,
            provider,
            model,
            timeout_seconds,
            retry_policy: default_retry_policy(),
            weight,
        });
        n += 1;
    }

    if members.is_empty() {
        return Err(ConfigError::NoMembers("StaticConfigurationProvider::from_env"));
    }
    Ok(members)
}

fn parse_provider_tag(raw: &str, member_id: &str) -> Result<ProviderTag, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "openai" => Ok(ProviderTag::OpenAi),
        "anthropic" => Ok(ProviderTag::Anthropic),
        "google" => Ok(ProviderTag::Google),
        "xai" => Ok(ProviderTag::Xai),
        _ => Err(ConfigError::UnknownProvider(raw.to_string(), member_id.to_string())),
    }
}

fn default_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 250,
        max_delay_ms: 4_000,
        backoff_multiplier: 2.0,
        retryable_errors: vec![
            ErrorKind::Timeout,
            ErrorKind::RateLimit,
            ErrorKind::ServiceUnavailable,
            ErrorKind::NetworkError,
        ],
    }
}

/// Reads `{PREFIX}_BASE_URL` / `{PREFIX}_API_KEY` for a provider tag, used by
/// `main.rs` to build adapters. Not a `ConfigurationProvider` method — the
/// adapter registry is assembled once at boot, outside the per-request
/// snapshot.
pub fn provider_credentials(prefix: &str, default_base_url: &str) -> (String, String) {
    let base_url = env::var(format!("{prefix}_BASE_URL")).unwrap_or_else(|_| default_base_url.to_string());
    let api_key = env::var(format!("{prefix}_API_KEY")).unwrap_or_default();
    (base_url, api_key)
}

/// Builds the full `SynthesisConfig` from env, defaulting to
/// `consensus-extraction` when `SYNTHESIS_STRATEGY` is unset. Weights
/// (`weighted-fusion`) are left empty by default — `weighted_fusion.rs`
/// falls back to an even split across responding members when no weight is
/// configured for any of them.
fn synthesis_config_from_env() -> Result<SynthesisConfig, ConfigError> {
    let strategy = match env::var("SYNTHESIS_STRATEGY")
        .unwrap_or_else(|_| "consensus-extraction".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "weighted-fusion" => SynthesisStrategyTag::WeightedFusion,
        "meta-synthesis" => SynthesisStrategyTag::MetaSynthesis,
        "iterative-consensus" => SynthesisStrategyTag::IterativeConsensus,
        _ => SynthesisStrategyTag::ConsensusExtraction,
    };

    Ok(SynthesisConfig {
        strategy,
        reducer_member_id: env::var("SYNTHESIS_REDUCER_MEMBER_ID").ok(),
        weights: HashMap::new(),
        moderator_strategy: moderator_strategy_from_env(),
        iterative_consensus: iterative_consensus_config_from_env()?,
    })
}

fn moderator_strategy_from_env() -> ModeratorStrategy {
    match env::var("SYNTHESIS_MODERATOR_STRATEGY")
        .unwrap_or_else(|_| "strongest".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "rotate" => ModeratorStrategy::Rotate,
        "strongest" => ModeratorStrategy::Strongest,
        permanent => ModeratorStrategy::Permanent(permanent.to_string()),
    }
}

fn iterative_consensus_config_from_env() -> Result<IterativeConsensusConfig, ConfigError> {
    let mut config = IterativeConsensusConfig::default();
    config.max_rounds = parse_u32_env("ITERATIVE_MAX_ROUNDS", config.max_rounds)?;
    config.per_round_timeout_seconds =
        parse_u64_env("ITERATIVE_PER_ROUND_TIMEOUT_SECONDS", config.per_round_timeout_seconds)?;
    config.escalation_rate_limit_per_hour = parse_u32_env(
        "ITERATIVE_ESCALATION_RATE_LIMIT_PER_HOUR",
        config.escalation_rate_limit_per_hour,
    )?;
    config.human_escalation_enabled =
        parse_bool_env("ITERATIVE_HUMAN_ESCALATION_ENABLED", config.human_escalation_enabled);
    config.fallback_strategy = match env::var("ITERATIVE_FALLBACK_STRATEGY")
        .unwrap_or_else(|_| "consensus-extraction".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "weighted-fusion" => FallbackStrategy::WeightedFusion,
        "meta-synthesis" => FallbackStrategy::MetaSynthesis,
        _ => FallbackStrategy::ConsensusExtraction,
    };
    config.agreement_threshold = parse_f64_env("ITERATIVE_AGREEMENT_THRESHOLD", config.agreement_threshold)?;
    config.early_termination_enabled =
        parse_bool_env("ITERATIVE_EARLY_TERMINATION_ENABLED", config.early_termination_enabled);
    config.early_termination_threshold = parse_f64_env(
        "ITERATIVE_EARLY_TERMINATION_THRESHOLD",
        config.early_termination_threshold,
    )?;
    config.negotiation_mode = match env::var("ITERATIVE_NEGOTIATION_MODE")
        .unwrap_or_else(|_| "sequential".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "parallel" => NegotiationMode::Parallel,
        _ => NegotiationMode::Sequential,
    };
    config.randomization_seed = env::var("ITERATIVE_RANDOMIZATION_SEED")
        .ok()
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| ConfigError::ParseInt("ITERATIVE_RANDOMIZATION_SEED".to_string()))
        })
        .transpose()?;
    config.example_count = parse_usize_env("ITERATIVE_EXAMPLE_COUNT", config.example_count)?;
    config.escalation_channels = env::var("ITERATIVE_ESCALATION_CHANNELS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Ok(config)
}

fn parse_f64_env(key: &str, default: f64) -> Result<f64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse::<f64>().map_err(|_| ConfigError::ParseFloat(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_u32_env(key: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse::<u32>().map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse::<u64>().map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse::<usize>().map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}
