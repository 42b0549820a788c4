//! Runtime configuration loaded from the environment (and `.env`)

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4-20250514";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MAX_ITERATIONS: usize = 5;
pub const DEFAULT_CONFIDENCE_THRESHOLD: i32 = 70;
pub const DEFAULT_CONVERSATION_TTL: Duration = Duration::from_secs(86_400);
/// Upper bound accepted for `AGENT_CONVERSATION_TTL_SECS` (one year).
pub const MAX_CONVERSATION_TTL: Duration = Duration::from_secs(365 * 86_400);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_iterations: usize,
    pub confidence_threshold: i32,
    pub conversation_ttl: Duration,
    pub base_currency: String,
    pub database_url: Option<String>,
    pub financial_api_base_url: Option<String>,
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            conversation_ttl: DEFAULT_CONVERSATION_TTL,
            base_currency: "USD".to_string(),
            database_url: None,
            financial_api_base_url: None,
            port: 8080,
        }
    }
}

impl AgentConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ttl_secs: u64 = parse_or(
            non_empty("AGENT_CONVERSATION_TTL_SECS"),
            "AGENT_CONVERSATION_TTL_SECS",
            defaults.conversation_ttl.as_secs(),
        )?;
        if ttl_secs == 0 || ttl_secs > MAX_CONVERSATION_TTL.as_secs() {
            return Err(OrchestrationError::ConfigError(format!(
                "AGENT_CONVERSATION_TTL_SECS must be between 1 and {}, got {}",
                MAX_CONVERSATION_TTL.as_secs(),
                ttl_secs
            )));
        }

        Ok(Self {
            api_key: non_empty("OPENROUTER_API_KEY").unwrap_or_default(),
            model: non_empty("OPENROUTER_AGENT_MODEL").unwrap_or(defaults.model),
            base_url: non_empty("OPENROUTER_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            temperature: parse_or(
                non_empty("AGENT_TEMPERATURE"),
                "AGENT_TEMPERATURE",
                defaults.temperature,
            )?,
            max_tokens: parse_or(
                non_empty("AGENT_MAX_TOKENS"),
                "AGENT_MAX_TOKENS",
                defaults.max_tokens,
            )?,
            max_iterations: parse_or(
                non_empty("AGENT_MAX_ITERATIONS"),
                "AGENT_MAX_ITERATIONS",
                defaults.max_iterations,
            )?,
            confidence_threshold: parse_or(
                non_empty("AGENT_CONFIDENCE_THRESHOLD"),
                "AGENT_CONFIDENCE_THRESHOLD",
                defaults.confidence_threshold,
            )?,
            conversation_ttl: Duration::from_secs(ttl_secs),
            base_currency: non_empty("AGENT_BASE_CURRENCY").unwrap_or(defaults.base_currency),
            database_url: non_empty("POSTGRES_URL").or_else(|| non_empty("DATABASE_URL")),
            financial_api_base_url: non_empty("FINANCIAL_API_BASE_URL")
                .or_else(|| non_empty("TOOLS_API_BASE_URL")),
            port: parse_or(
                non_empty("PORT").or_else(|| non_empty("API_PORT")),
                "PORT",
                defaults.port,
            )?,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has an invalid value: {}", key, value))
        }),
    }
}
