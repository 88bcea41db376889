use thiserror::Error;

/// Result type for rate limit operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors that can occur in the rate limit service
///
/// Store-level failures are never folded into an admission decision: a
/// `StoreUnavailable` or `Redis` error reaches the caller as an error so the
/// edge can answer with an infrastructure status instead of a 429.
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("counter store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
