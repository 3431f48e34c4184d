//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::AgentConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut AgentConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str, overrides: &ConfigOverrides) -> Result<AgentConfig, ConfigError> {
    let mut config: AgentConfig = toml::from_str(content)?;
    overrides.apply(&mut config);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path, overrides: &ConfigOverrides) -> Result<AgentConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content, overrides)?;

    tracing::debug!(path = %path.display(), plugins = config.plugins.len(), "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
        [listener]
        bind = "127.0.0.1"

        [[plugins]]
        name = "web"
        fetcher = "file"
        params = { path = "/var/run/web.load" }
        thresholds = [{ pct = 7000 }]
    "#;

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = load_config(file.path(), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.plugins.len(), 1);
        assert_eq!(config.listener.bind, "127.0.0.1");
    }

    #[test]
    fn overrides_win_over_file() {
        let overrides = ConfigOverrides {
            bind: Some("10.0.0.1".into()),
            port: Some(7777),
            log_level: Some("debug".into()),
        };
        let config = parse_config(CONFIG, &overrides).unwrap();
        assert_eq!(config.listener.bind, "10.0.0.1");
        assert_eq!(config.listener.port, 7777);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.toml"), &ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        let err = parse_config("[[plugins]\nname =", &ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_errors_are_listed() {
        let err = parse_config(&CONFIG.replace("pct = 7000", "pct = \"x\""), &ConfigOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("plugin 'web'"));
    }
}
