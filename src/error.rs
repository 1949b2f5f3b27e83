//! Top-level error types for membot.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Rejected at the REST boundary. Maps to 400, never audited.
    #[error("validation error: {0}")]
    Validation(String),

    /// Maps to 404, never audited.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Database connection and migration errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to connect to SQLite: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stream broker errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("consumer group error: {0}")]
    ConsumerGroup(String),

    #[error("malformed stream message: {0}")]
    Payload(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// LLM endpoint errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no valid JSON object found in LLM reply: {0}")]
    MalformedReply(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Assistant agent errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("session store error: {0}")]
    Session(String),

    #[error("core API error: {0}")]
    CoreApi(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
