//! Redis configuration
//!
//! The Redis node is named either by a single `url`, or by the `addrs`
//! list with optional `password` and `db`. Only one node is supported;
//! listing several addresses fails validation.

use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const DEFAULT_REDIS_PORT: u16 = 6379;

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Connection URL (`redis://` or `rediss://`)
    #[serde(default)]
    pub url: String,

    /// `host:port` of the node, as an alternative to `url`
    #[serde(default)]
    pub addrs: Vec<String>,

    /// Password used with `addrs`
    #[serde(default)]
    pub password: Option<String>,

    /// Database index used with `addrs`
    #[serde(default)]
    pub db: i64,

    /// Connect and ping timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Prefix prepended to every delivery claim key
    #[serde(default = "default_lock_key_prefix")]
    pub lock_key_prefix: String,
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connection target for `redis::Client::open`.
    pub fn connection_info(&self) -> Result<ConnectionInfo, ValidationError> {
        match (self.url.is_empty(), self.addrs.as_slice()) {
            (true, []) => Err(ValidationError::MissingRequired("redis.url or redis.addrs")),
            (false, []) => {
                if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
                    return Err(ValidationError::InvalidRedisUrl);
                }
                self.url
                    .as_str()
                    .into_connection_info()
                    .map_err(|_| ValidationError::InvalidRedisUrl)
            }
            (true, [addr]) => {
                let (host, port) = parse_addr(addr)?;
                Ok(ConnectionInfo {
                    addr: ConnectionAddr::Tcp(host, port),
                    redis: RedisConnectionInfo {
                        db: self.db,
                        password: self.password.clone().filter(|p| !p.is_empty()),
                        ..Default::default()
                    },
                })
            }
            (true, addrs) => Err(ValidationError::RedisClusterUnsupported(addrs.len())),
            (false, _) => Err(ValidationError::ConflictingRedisTarget),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection_info()?;
        if self.db < 0 {
            return Err(ValidationError::InvalidRedisDb(self.db));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("redis.timeout_secs"));
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            addrs: Vec::new(),
            password: None,
            db: 0,
            timeout_secs: default_timeout(),
            lock_key_prefix: default_lock_key_prefix(),
        }
    }
}

fn parse_addr(addr: &str) -> Result<(String, u16), ValidationError> {
    let invalid = || ValidationError::InvalidRedisAddr(addr.to_string());

    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (addr, DEFAULT_REDIS_PORT),
    };
    if host.is_empty() || port == 0 {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}

fn default_timeout() -> u64 {
    5
}

fn default_lock_key_prefix() -> String {
    "event-relay:dedup:".to_string()
}
