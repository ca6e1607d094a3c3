//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Invalid Redis address '{0}', expected host:port")]
    InvalidRedisAddr(String),

    #[error("Invalid Redis database index {0}")]
    InvalidRedisDb(i64),

    #[error("{0} Redis addresses given, only a single node is supported")]
    RedisClusterUnsupported(usize),

    #[error("Set either redis.url or redis.addrs, not both")]
    ConflictingRedisTarget,

    #[error("Invalid timeout: {0} must be greater than zero")]
    InvalidTimeout(&'static str),

    #[error("Restart backoff: initial delay exceeds maximum delay")]
    InvalidBackoff,
}
