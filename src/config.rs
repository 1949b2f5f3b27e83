//! Configuration loading and validation.
//!
//! Each service reads its configuration from environment variables at
//! startup. Values shared between services (store path, broker URL) use
//! the same variable names so a single `.env` can drive all four.

use crate::error::{ConfigError, Result};
use crate::UserId;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env_var(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            ConfigError::Invalid(format!("{name} must be a number, got {raw:?}")).into()
        }),
    }
}

/// Parse a comma-separated list of user ids (e.g. `ALLOWED_USER_IDS=12,34`).
fn parse_user_ids(raw: &str) -> Result<Vec<UserId>> {
    let mut ids = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id = part.parse::<UserId>().map_err(|_| {
            ConfigError::Invalid(format!("invalid user id in allowed list: {part:?}"))
        })?;
        ids.push(id);
    }
    Ok(ids)
}

/// Core service configuration (REST + scheduler).
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// SQLite database file path.
    pub database_path: String,
    /// Redis broker URL.
    pub redis_url: String,
    /// Directory holding media blobs owned by memories.
    pub media_dir: String,
    /// Bind address for the REST server.
    pub bind_addr: std::net::SocketAddr,
    /// Seconds between housekeeping scheduler ticks.
    pub scheduler_interval_secs: u64,
}

impl CoreConfig {
    pub fn load() -> Result<Self> {
        let bind_addr = env_var("CORE_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8000".into())
            .parse()
            .map_err(|_| ConfigError::Invalid("CORE_BIND_ADDR must be host:port".into()))?;

        Ok(Self {
            database_path: env_var("DATABASE_PATH").unwrap_or_else(|| "./data/membot.db".into()),
            redis_url: env_var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            media_dir: env_var("MEDIA_DIR").unwrap_or_else(|| "./data/media".into()),
            bind_addr,
            scheduler_interval_secs: env_parse("SCHEDULER_INTERVAL_SECS", 30)?,
        })
    }
}

/// LLM worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis broker URL.
    pub redis_url: String,
    /// Core REST base URL.
    pub core_api_url: String,
    /// OpenAI-compatible LLM endpoint base URL.
    pub llm_base_url: String,
    /// API key for the LLM endpoint (local endpoints ignore it).
    pub llm_api_key: String,
    /// Text model name.
    pub llm_text_model: String,
    /// Vision model name.
    pub llm_vision_model: String,
    /// Stable consumer name for this replica within the consumer group.
    pub consumer_name: String,
    /// Attempts before a job is marked failed.
    pub max_retries: u32,
}

impl WorkerConfig {
    pub fn load() -> Result<Self> {
        Ok(Self {
            redis_url: env_var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            core_api_url: env_var("CORE_API_URL").unwrap_or_else(|| "http://127.0.0.1:8000".into()),
            llm_base_url: env_var("LLM_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:11434/v1".into()),
            llm_api_key: env_var("LLM_API_KEY").unwrap_or_else(|| "not-needed".into()),
            llm_text_model: env_var("LLM_TEXT_MODEL").unwrap_or_else(|| "mistral".into()),
            llm_vision_model: env_var("LLM_VISION_MODEL").unwrap_or_else(|| "llava".into()),
            consumer_name: env_var("WORKER_CONSUMER_NAME").unwrap_or_else(|| "llm-worker-1".into()),
            max_retries: env_parse("WORKER_MAX_RETRIES", 5)?,
        })
    }
}

/// Assistant service configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Redis broker URL (session state + digest markers).
    pub redis_url: String,
    /// Core REST base URL.
    pub core_api_url: String,
    /// OpenAI-compatible LLM endpoint base URL.
    pub llm_base_url: String,
    /// API key for the LLM endpoint.
    pub llm_api_key: String,
    /// Chat model name; also selects the token encoder.
    pub llm_model: String,
    /// Users allowed to talk to the assistant.
    pub allowed_user_ids: Vec<UserId>,
    /// Model context window in tokens.
    pub context_window_tokens: usize,
    /// Tokens reserved for the briefing block.
    pub briefing_budget_tokens: usize,
    /// Tokens reserved for the model's response.
    pub response_reserve_tokens: usize,
    /// Local hour at which the daily digest is sent.
    pub digest_hour: u32,
}

impl AssistantConfig {
    pub fn load() -> Result<Self> {
        let allowed = env_var("ALLOWED_USER_IDS").unwrap_or_default();

        Ok(Self {
            redis_url: env_var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            core_api_url: env_var("CORE_API_URL").unwrap_or_else(|| "http://127.0.0.1:8000".into()),
            llm_base_url: env_var("LLM_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:11434/v1".into()),
            llm_api_key: env_var("LLM_API_KEY").unwrap_or_else(|| "not-needed".into()),
            llm_model: env_var("LLM_CHAT_MODEL").unwrap_or_else(|| "gpt-4o".into()),
            allowed_user_ids: parse_user_ids(&allowed)?,
            context_window_tokens: env_parse("CONTEXT_WINDOW_TOKENS", 16_000)?,
            briefing_budget_tokens: env_parse("BRIEFING_BUDGET_TOKENS", 1_500)?,
            response_reserve_tokens: env_parse("RESPONSE_RESERVE_TOKENS", 1_000)?,
            digest_hour: env_parse("DIGEST_HOUR", 8)?,
        })
    }
}

/// Chat gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Redis broker URL.
    pub redis_url: String,
    /// Core REST base URL.
    pub core_api_url: String,
    /// Chat platform bot token.
    pub bot_token: String,
    /// Users allowed to use the bot.
    pub allowed_user_ids: Vec<UserId>,
    /// Stable consumer name within the gateway consumer group.
    pub consumer_name: String,
}

impl GatewayConfig {
    pub fn load() -> Result<Self> {
        let bot_token = env_var("BOT_TOKEN")
            .ok_or_else(|| ConfigError::MissingVar("BOT_TOKEN".into()))?;
        let allowed = env_var("ALLOWED_USER_IDS").unwrap_or_default();

        Ok(Self {
            redis_url: env_var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            core_api_url: env_var("CORE_API_URL").unwrap_or_else(|| "http://127.0.0.1:8000".into()),
            bot_token,
            allowed_user_ids: parse_user_ids(&allowed)?,
            consumer_name: env_var("GATEWAY_CONSUMER_NAME").unwrap_or_else(|| "gateway-1".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::parse_user_ids;

    #[test]
    fn test_parse_user_ids() {
        assert_eq!(parse_user_ids("12, 34,56").unwrap(), vec![12, 34, 56]);
        assert_eq!(parse_user_ids("").unwrap(), Vec::<i64>::new());
        assert_eq!(parse_user_ids(" , ").unwrap(), Vec::<i64>::new());
        assert!(parse_user_ids("12,abc").is_err());
    }
}
