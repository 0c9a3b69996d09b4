//! CLI override definitions and application logic.

use clap::Parser;

use crate::Config;
use crate::types::{RedisConfig, SqlConfig, StoreConfig};

#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Override the store URL. The scheme selects the backend when the
    /// config has none (redis:// or a SQL scheme).
    #[arg(long, env = "KEYGATE_STORE_URL")]
    pub store_url: Option<String>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Override log format (pretty/compact/json)
    #[arg(long)]
    pub log_format: Option<String>,
    /// Override bcrypt cost for new hashes
    #[arg(long)]
    pub bcrypt_cost: Option<u32>,
    /// Override default session lifetime (seconds)
    #[arg(long)]
    pub session_ttl_secs: Option<u64>,
}

pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) {
    if let Some(url) = &overrides.store_url {
        match &mut config.store {
            StoreConfig::Sql(sql) => sql.url = url.clone(),
            StoreConfig::Redis(redis) => redis.url = url.clone(),
            // memory has no URL; pick the backend from the scheme
            StoreConfig::Memory => {
                config.store = if url.starts_with("redis://") || url.starts_with("rediss://") {
                    StoreConfig::Redis(RedisConfig::new(url.clone()))
                } else {
                    StoreConfig::Sql(SqlConfig::new(url.clone()))
                };
            }
        }
    }
    if let Some(v) = &overrides.log_level {
        config.logging.level = Some(v.clone());
    }
    if let Some(v) = &overrides.log_format {
        config.logging.format = Some(v.clone());
    }
    if let Some(v) = overrides.bcrypt_cost {
        config.sessions.bcrypt_cost = v;
    }
    if let Some(v) = overrides.session_ttl_secs {
        config.sessions.default_ttl_secs = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_override_keeps_backend() {
        let mut cfg = Config {
            store: StoreConfig::Sql(SqlConfig::new("sqlite:old.db")),
            ..Default::default()
        };
        let overrides = CliOverrides {
            store_url: Some("sqlite:new.db".into()),
            ..Default::default()
        };
        apply_overrides(&mut cfg, &overrides);
        assert_eq!(cfg.store.url(), Some("sqlite:new.db"));
    }

    #[test]
    fn url_override_selects_backend_for_memory() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            &CliOverrides {
                store_url: Some("redis://127.0.0.1/".into()),
                ..Default::default()
            },
        );
        assert!(matches!(cfg.store, StoreConfig::Redis(_)));

        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            &CliOverrides {
                store_url: Some("postgres://db/keygate".into()),
                ..Default::default()
            },
        );
        assert!(matches!(cfg.store, StoreConfig::Sql(_)));
    }

    #[test]
    fn scalar_overrides() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            &CliOverrides {
                log_level: Some("trace".into()),
                bcrypt_cost: Some(5),
                session_ttl_secs: Some(90),
                ..Default::default()
            },
        );
        assert_eq!(cfg.logging.level.as_deref(), Some("trace"));
        assert_eq!(cfg.sessions.bcrypt_cost, 5);
        assert_eq!(cfg.sessions.default_ttl_secs, 90);
        assert!(matches!(cfg.store, StoreConfig::Memory));
    }
}
