//! Application configuration module
//!
//! This module provides type-safe configuration loading using the `config`
//! and `dotenvy` crates. Values come from an optional YAML file overridden
//! by environment variables with the `EVENT_RELAY` prefix; nested values use
//! double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use event_relay::config::AppConfig;
//!
//! let config = AppConfig::load(None).expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod error;
mod redis;
mod relay;
mod server;

pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use relay::RelayConfig;
pub use server::{Environment, LogFormat, ServerConfig};

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the YAML configuration file
pub const CONFIG_PATH_ENV: &str = "EVENT_RELAY_CONFIG";

/// File read when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Root application configuration
///
/// Load using [`AppConfig::load()`].
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration (pub/sub and delivery claims)
    pub redis: RedisConfig,

    /// Relay timeouts and supervision
    #[serde(default)]
    pub relay: RelayConfig,
}

impl AppConfig {
    /// Load configuration
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads the YAML file at `path`, if it exists
    /// 3. Reads environment variables with `EVENT_RELAY` prefix
    /// 4. Uses `__` (double underscore) to separate nested values
    /// 5. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `EVENT_RELAY__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `EVENT_RELAY__REDIS__URL=...` -> `redis.url = ...`
    /// - `EVENT_RELAY__REDIS__ADDRS=cache:6379` -> `redis.addrs = ["cache:6379"]`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required values are missing
    /// - Values cannot be parsed into expected types
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        let config = config::Config::builder()
            .add_source(config::File::from(path.as_path()).required(false))
            .add_source(
                config::Environment::default()
                    .prefix("EVENT_RELAY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("redis.addrs"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Configuration file path from `EVENT_RELAY_CONFIG`, else `config.yaml`
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.redis.validate()?;
        self.relay.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
