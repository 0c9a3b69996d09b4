//! Configuration types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::defaults::*;

/// Top-level configuration.
///
/// Every section is optional; an empty file yields an in-memory store with
/// default session settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage backend selection.
///
/// ```toml
/// [store]
/// type = "sql"
/// url = "sqlite:keygate.db"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process maps; nothing survives a restart.
    #[default]
    Memory,
    /// PostgreSQL, MySQL or SQLite, picked from the URL scheme.
    Sql(SqlConfig),
    /// Redis-compatible key-value server.
    Redis(RedisConfig),
}

impl StoreConfig {
    /// Connection URL of the selected backend, if it has one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Memory => None,
            Self::Sql(sql) => Some(&sql.url),
            Self::Redis(redis) => Some(&redis.url),
        }
    }

    /// Short backend name for log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sql(_) => "sql",
            Self::Redis(_) => "redis",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlConfig {
    /// `postgres://...`, `mysql://...` or `sqlite:...`.
    pub url: String,
    #[serde(default = "default_sql_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_sql_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_sql_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_session_table")]
    pub session_table: String,
    #[serde(default = "default_user_table")]
    pub user_table: String,
    /// Column type of `user_id` in the session table.
    #[serde(default = "default_user_id_type")]
    pub user_id_type: String,
    /// Serialize all calls through one lock. Unset: on for SQLite only.
    #[serde(default)]
    pub lock_db: Option<bool>,
}

impl SqlConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_SQL_MAX_CONNECTIONS,
            min_connections: DEFAULT_SQL_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_SQL_CONNECT_TIMEOUT_SECS,
            session_table: default_session_table(),
            user_table: default_user_table(),
            user_id_type: default_user_id_type(),
            lock_db: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `redis://host:port/db`.
    pub url: String,
    #[serde(default = "default_redis_session_prefix")]
    pub session_prefix: String,
    #[serde(default = "default_redis_user_set_prefix")]
    pub user_set_prefix: String,
    #[serde(default = "default_redis_user_prefix")]
    pub user_prefix: String,
    #[serde(default = "default_redis_user_id_prefix")]
    pub user_id_prefix: String,
    #[serde(default = "default_redis_next_id_key")]
    pub next_id_key: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session_prefix: default_redis_session_prefix(),
            user_set_prefix: default_redis_user_set_prefix(),
            user_prefix: default_redis_user_prefix(),
            user_id_prefix: default_redis_user_id_prefix(),
            next_id_key: default_redis_next_id_key(),
        }
    }
}

/// Session issuing and password hashing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Length of generated session keys.
    #[serde(default = "default_key_length")]
    pub key_length: usize,
    /// Attempts before giving up on a unique key.
    #[serde(default = "default_max_key_attempts")]
    pub max_key_attempts: u32,
    /// Lifetime of sessions issued without an explicit one.
    #[serde(default = "default_session_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Period of the invalid-key sweep.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            max_key_attempts: DEFAULT_MAX_KEY_ATTEMPTS,
            default_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: Option<String>,
    /// Log format: json, pretty, or compact. Default: pretty.
    pub format: Option<String>,
    /// Output target: stdout or stderr. Default: stderr.
    pub output: Option<String>,
    /// Per-module log level filters (e.g., {"keygate_auth": "debug", "sqlx": "warn"}).
    #[serde(default)]
    pub filters: HashMap<String, String>,
}
