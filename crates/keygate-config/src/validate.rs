//! Configuration validation logic.

use crate::Config;
use crate::defaults::*;
use crate::loader::ConfigError;
use crate::types::StoreConfig;

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    match &config.store {
        StoreConfig::Memory => {}
        StoreConfig::Sql(sql) => {
            if sql.url.trim().is_empty() {
                return Err(ConfigError::Validation("store.url is empty".into()));
            }
            if !SUPPORTED_SQL_SCHEMES.iter().any(|s| sql.url.starts_with(s)) {
                return Err(ConfigError::Validation(format!(
                    "store.url has an unsupported scheme (expected one of: {:?})",
                    SUPPORTED_SQL_SCHEMES
                )));
            }
            if sql.max_connections == 0 {
                return Err(ConfigError::Validation(
                    "store.max_connections must be > 0".into(),
                ));
            }
            if sql.min_connections > sql.max_connections {
                return Err(ConfigError::Validation(
                    "store.min_connections cannot exceed store.max_connections".into(),
                ));
            }
            if sql.session_table.trim().is_empty() || sql.user_table.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "store table names must not be empty".into(),
                ));
            }
        }
        StoreConfig::Redis(redis) => {
            if redis.url.trim().is_empty() {
                return Err(ConfigError::Validation("store.url is empty".into()));
            }
            let prefixes = [
                ("session_prefix", &redis.session_prefix),
                ("user_set_prefix", &redis.user_set_prefix),
                ("user_prefix", &redis.user_prefix),
                ("user_id_prefix", &redis.user_id_prefix),
            ];
            if prefixes.iter().any(|(_, p)| p.is_empty()) || redis.next_id_key.is_empty() {
                return Err(ConfigError::Validation(
                    "store key prefixes must not be empty".into(),
                ));
            }
            // a key written under one prefix must never match another
            for (i, (name, prefix)) in prefixes.iter().enumerate() {
                for (other, other_prefix) in &prefixes[i + 1..] {
                    if prefix.starts_with(other_prefix.as_str())
                        || other_prefix.starts_with(prefix.as_str())
                    {
                        return Err(ConfigError::Validation(format!(
                            "store.{name} and store.{other} overlap"
                        )));
                    }
                }
                if redis.next_id_key.starts_with(prefix.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "store.next_id_key falls under store.{name}"
                    )));
                }
            }
        }
    }

    let sessions = &config.sessions;
    if !(MIN_KEY_LENGTH..=MAX_KEY_LENGTH).contains(&sessions.key_length) {
        return Err(ConfigError::Validation(format!(
            "sessions.key_length must be {MIN_KEY_LENGTH}..={MAX_KEY_LENGTH}"
        )));
    }
    if sessions.max_key_attempts == 0 {
        return Err(ConfigError::Validation(
            "sessions.max_key_attempts must be > 0".into(),
        ));
    }
    if sessions.default_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "sessions.default_ttl_secs must be > 0".into(),
        ));
    }
    if sessions.cleanup_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sessions.cleanup_interval_secs must be > 0".into(),
        ));
    }
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&sessions.bcrypt_cost) {
        return Err(ConfigError::Validation(format!(
            "sessions.bcrypt_cost must be {MIN_BCRYPT_COST}..={MAX_BCRYPT_COST}"
        )));
    }

    if let Some(format) = config.logging.format.as_deref()
        && !matches!(format, "pretty" | "compact" | "json")
    {
        return Err(ConfigError::Validation(
            "logging.format must be 'pretty', 'compact' or 'json'".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RedisConfig, SqlConfig};

    fn expect_invalid(config: &Config, needle: &str) {
        match validate_config(config) {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains(needle), "{msg:?} does not mention {needle:?}")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        validate_config(&Config::default()).unwrap();
        validate_config(&Config {
            store: StoreConfig::Sql(SqlConfig::new("postgres://localhost/keygate")),
            ..Default::default()
        })
        .unwrap();
        validate_config(&Config {
            store: StoreConfig::Redis(RedisConfig::new("redis://localhost/")),
            ..Default::default()
        })
        .unwrap();
    }

    #[test]
    fn rejects_bad_store() {
        let cfg = Config {
            store: StoreConfig::Sql(SqlConfig::new("")),
            ..Default::default()
        };
        expect_invalid(&cfg, "store.url is empty");

        let cfg = Config {
            store: StoreConfig::Sql(SqlConfig::new("oracle://db")),
            ..Default::default()
        };
        expect_invalid(&cfg, "unsupported scheme");

        let cfg = Config {
            store: StoreConfig::Redis(RedisConfig::new(" ")),
            ..Default::default()
        };
        expect_invalid(&cfg, "store.url is empty");
    }

    #[test]
    fn rejects_overlapping_redis_prefixes() {
        let mut redis = RedisConfig::new("redis://localhost/");
        redis.user_prefix = "u:".into();
        redis.user_id_prefix = "u:id:".into();
        let cfg = Config {
            store: StoreConfig::Redis(redis),
            ..Default::default()
        };
        expect_invalid(&cfg, "store.user_prefix and store.user_id_prefix overlap");

        let mut redis = RedisConfig::new("redis://localhost/");
        redis.user_set_prefix = "user:sessions:".into();
        let cfg = Config {
            store: StoreConfig::Redis(redis),
            ..Default::default()
        };
        expect_invalid(&cfg, "store.user_set_prefix and store.user_prefix overlap");

        let mut redis = RedisConfig::new("redis://localhost/");
        redis.next_id_key = "user:next".into();
        let cfg = Config {
            store: StoreConfig::Redis(redis),
            ..Default::default()
        };
        expect_invalid(&cfg, "next_id_key falls under store.user_prefix");

        let mut redis = RedisConfig::new("redis://localhost/");
        redis.user_id_prefix = String::new();
        let cfg = Config {
            store: StoreConfig::Redis(redis),
            ..Default::default()
        };
        expect_invalid(&cfg, "must not be empty");
    }

    #[test]
    fn rejects_bad_sessions() {
        let mut cfg = Config::default();
        cfg.sessions.key_length = 8;
        expect_invalid(&cfg, "key_length");

        let mut cfg = Config::default();
        cfg.sessions.key_length = 129;
        expect_invalid(&cfg, "key_length");

        let mut cfg = Config::default();
        cfg.sessions.max_key_attempts = 0;
        expect_invalid(&cfg, "max_key_attempts");

        let mut cfg = Config::default();
        cfg.sessions.default_ttl_secs = 0;
        expect_invalid(&cfg, "default_ttl_secs");

        let mut cfg = Config::default();
        cfg.sessions.bcrypt_cost = 3;
        expect_invalid(&cfg, "bcrypt_cost");

        let mut cfg = Config::default();
        cfg.sessions.bcrypt_cost = 32;
        expect_invalid(&cfg, "bcrypt_cost");
    }

    #[test]
    fn rejects_bad_log_format() {
        let mut cfg = Config::default();
        cfg.logging.format = Some("xml".into());
        expect_invalid(&cfg, "logging.format");
    }
}
