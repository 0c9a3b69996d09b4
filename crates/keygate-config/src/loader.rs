//! Configuration file loading and error types.

use std::{fs, path::Path};

use crate::Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config format")]
    UnsupportedFormat,
    #[error("validation: {0}")]
    Validation(String),
}

/// Load a config file, picking the format from its extension.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)?;
    match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
        "json" => Ok(serde_json::from_str(&data)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&data)?),
        "toml" => Ok(toml::from_str(&data)?),
        _ => Err(ConfigError::UnsupportedFormat),
    }
}

/// Like [`load_config`], but a missing file yields the default config.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    match load_config(path) {
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(Config::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::StoreConfig;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_toml() {
        let file = write_temp(
            ".toml",
            r#"
[store]
type = "sql"
url = "sqlite:keygate.db"
lock_db = false
"#,
        );
        let cfg = load_config(file.path()).unwrap();
        let StoreConfig::Sql(sql) = cfg.store else {
            panic!("expected sql store");
        };
        assert_eq!(sql.url, "sqlite:keygate.db");
        assert_eq!(sql.lock_db, Some(false));
    }

    #[test]
    fn load_json() {
        let file = write_temp(
            ".json",
            r#"{"store": {"type": "redis", "url": "redis://localhost/"}, "sessions": {"default_ttl_secs": 60}}"#,
        );
        let cfg = load_config(file.path()).unwrap();
        assert!(matches!(cfg.store, StoreConfig::Redis(_)));
        assert_eq!(cfg.sessions.default_ttl_secs, 60);
    }

    #[test]
    fn load_yaml() {
        let file = write_temp(
            ".yml",
            "store:\n  type: memory\nlogging:\n  level: warn\n",
        );
        let cfg = load_config(file.path()).unwrap();
        assert!(matches!(cfg.store, StoreConfig::Memory));
        assert_eq!(cfg.logging.level.as_deref(), Some("warn"));
    }

    #[test]
    fn unknown_extension() {
        let file = write_temp(".ini", "store = memory");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::UnsupportedFormat)
        ));
    }

    #[test]
    fn parse_error_is_reported() {
        let file = write_temp(".toml", "[store]\ntype = 5\n");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(load_config(&path), Err(ConfigError::Io(_))));
        let cfg = load_config_or_default(&path).unwrap();
        assert!(matches!(cfg.store, StoreConfig::Memory));
    }
}
