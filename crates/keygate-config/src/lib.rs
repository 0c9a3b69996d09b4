//! Configuration loading and validation for keygate.
//!
//! A config file selects the storage backend, session settings and logging:
//!
//! ```toml
//! [store]
//! type = "sql"
//! url = "sqlite:keygate.db"
//!
//! [sessions]
//! default_ttl_secs = 86400
//!
//! [logging]
//! level = "info"
//! ```
//!
//! TOML, JSON and YAML are accepted; the format follows the file extension.

mod cli;
pub mod defaults;
mod loader;
mod types;
mod validate;

pub use cli::{CliOverrides, apply_overrides};
pub use loader::{ConfigError, load_config, load_config_or_default};
pub use types::{Config, LoggingConfig, RedisConfig, SessionsConfig, SqlConfig, StoreConfig};
pub use validate::validate_config;
