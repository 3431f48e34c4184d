//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile every rule, expression and response token
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Detect plugins sharing a name or a listening address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AgentConfig → Result<(), Vec<ValidationError>>
//! - Runs before any scheduler or listener starts

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::config::schema::{AgentConfig, ListenerConfig, PluginConfig};
use crate::rules::patterns::PatternTable;
use crate::rules::response::AgentResponse;
use crate::rules::thresholds::ThresholdTable;
use crate::rules::RuleSet;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Where the problem is, e.g. `plugin 'web'` or `listener`.
    pub scope: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Rules and responses of one plugin, compiled from its configuration.
#[derive(Debug, Clone)]
pub struct CompiledPlugin {
    pub rules: RuleSet,
    pub staleness_response: AgentResponse,
    pub startup_response: AgentResponse,
    pub listen_addr: SocketAddr,
}

pub(crate) fn plugin_scope(index: usize, plugin: &PluginConfig) -> String {
    if plugin.name.trim().is_empty() {
        format!("plugins[{}]", index)
    } else {
        format!("plugin '{}'", plugin.name)
    }
}

/// Resolve the address a plugin listens on.
pub fn listen_addr(plugin: &PluginConfig, listener: &ListenerConfig) -> Result<SocketAddr, String> {
    let bind = plugin.bind.as_deref().unwrap_or(&listener.bind);
    let ip: IpAddr = bind
        .parse()
        .map_err(|_| format!("bind address '{}' is not an IP address", bind))?;
    Ok(SocketAddr::new(ip, plugin.port.unwrap_or(listener.port)))
}

/// Compile everything in `plugin` that can be checked without I/O.
pub fn compile_plugin(
    scope: &str,
    plugin: &PluginConfig,
    listener: &ListenerConfig,
) -> Result<CompiledPlugin, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let response = |field: &str, value: &toml::Value, errors: &mut Vec<ValidationError>| {
        AgentResponse::from_toml(value)
            .map_err(|e| errors.push(ValidationError::new(scope, format!("{}: {}", field, e))))
            .ok()
    };

    let default_response = response("default_response", &plugin.default_response, &mut errors);
    let staleness_response = response("staleness_response", &plugin.staleness_response, &mut errors);
    let startup_response = match &plugin.startup_response {
        Some(value) => response("startup_response", value, &mut errors),
        None => staleness_response,
    };

    let thresholds = if plugin.thresholds.is_empty() {
        None
    } else {
        ThresholdTable::compile(&plugin.thresholds_metric, &plugin.thresholds)
            .map_err(|rule_errors| {
                errors.extend(
                    rule_errors
                        .into_iter()
                        .map(|e| ValidationError::new(scope, format!("thresholds: {}", e))),
                )
            })
            .ok()
    };

    let patterns = if plugin.patterns.is_empty() {
        None
    } else {
        PatternTable::compile(&plugin.patterns_metric, &plugin.patterns)
            .map_err(|rule_errors| {
                errors.extend(
                    rule_errors
                        .into_iter()
                        .map(|e| ValidationError::new(scope, format!("patterns: {}", e))),
                )
            })
            .ok()
    };

    let listen_addr = listen_addr(plugin, listener)
        .map_err(|message| errors.push(ValidationError::new(scope, message)))
        .ok();

    if plugin.fetcher.trim().is_empty() {
        errors.push(ValidationError::new(scope, "fetcher must not be empty"));
    }
    if plugin.interval_secs == 0 {
        errors.push(ValidationError::new(scope, "interval must be greater than 0"));
    }
    if plugin.stop_timeout_secs == 0 {
        errors.push(ValidationError::new(scope, "stop_timeout must be greater than 0"));
    }

    match (default_response, staleness_response, startup_response, listen_addr) {
        (Some(default_response), Some(staleness_response), Some(startup_response), Some(listen_addr))
            if errors.is_empty() =>
        {
            Ok(CompiledPlugin {
                rules: RuleSet::new(thresholds, patterns, default_response),
                staleness_response,
                startup_response,
                listen_addr,
            })
        }
        _ => Err(errors),
    }
}

/// Validate the whole configuration, collecting every problem.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener", "max_connections must be greater than 0"));
    }
    if config.listener.write_timeout_ms == 0 {
        errors.push(ValidationError::new("listener", "write_timeout_ms must be greater than 0"));
    }
    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability",
            format!("unknown log_level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability",
            format!("invalid metrics_address '{}'", config.observability.metrics_address),
        ));
    }

    if config.plugins.is_empty() {
        errors.push(ValidationError::new("plugins", "at least one plugin must be configured"));
    }

    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut addrs: HashMap<SocketAddr, &str> = HashMap::new();

    for (index, plugin) in config.plugins.iter().enumerate() {
        let scope = plugin_scope(index, plugin);

        if plugin.name.trim().is_empty() {
            errors.push(ValidationError::new(&scope, "name must not be empty"));
        } else if let Some(first) = names.insert(plugin.name.as_str(), index) {
            errors.push(ValidationError::new(
                &scope,
                format!("name is already used by plugins[{}]", first),
            ));
        }

        match compile_plugin(&scope, plugin, &config.listener) {
            Ok(compiled) => {
                // Port 0 asks the OS for a free port, so it never collides.
                if compiled.listen_addr.port() != 0 {
                    if let Some(other) = addrs.insert(compiled.listen_addr, plugin.name.as_str()) {
                        errors.push(ValidationError::new(
                            &scope,
                            format!("address {} is already used by plugin '{}'", compiled.listen_addr, other),
                        ));
                    }
                }
            }
            Err(plugin_errors) => errors.extend(plugin_errors),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> AgentConfig {
        toml::from_str(src).unwrap()
    }

    const VALID: &str = r#"
        [[plugins]]
        name = "web"
        fetcher = "http"
        params = { url = "http://127.0.0.1:8080/stats" }
        port = 5556
        is_json = true
        thresholds_metric = "r['requests_per_second']"
        thresholds = [{ pct = 7000, min_threshold_response = 1 }]
        default_response = "noop"
    "#;

    #[test]
    fn valid_config_passes() {
        assert_eq!(validate_config(&parse(VALID)), Ok(()));
    }

    #[test]
    fn non_numeric_threshold_is_rejected() {
        let config = parse(&VALID.replace("pct = 7000", "pct = \"lots\""));
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].scope, "plugin 'web'");
        assert!(errors[0].message.contains("not numeric"), "{}", errors[0]);
    }

    #[test]
    fn collects_every_error() {
        let config = parse(
            r#"
            [listener]
            max_connections = 0

            [[plugins]]
            name = "a"
            fetcher = "file"
            interval = 0
            port = 6000
            default_response = "sideways"
            thresholds_metric = "r["
            thresholds = [{ up = "<5" }]

            [[plugins]]
            name = "a"
            fetcher = "file"
            port = 6000
            "#,
        );

        let errors = validate_config(&config).unwrap_err();
        let text: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert!(text.iter().any(|e| e.contains("max_connections")), "{:?}", text);
        assert!(text.iter().any(|e| e.contains("interval must be greater")), "{:?}", text);
        assert!(text.iter().any(|e| e.contains("default_response")), "{:?}", text);
        assert!(text.iter().any(|e| e.contains("metric expression")), "{:?}", text);
        assert!(text.iter().any(|e| e.contains("name is already used")), "{:?}", text);
    }

    #[test]
    fn duplicate_addresses_are_rejected() {
        let config = parse(
            r#"
            [[plugins]]
            name = "a"
            fetcher = "file"
            port = 6000

            [[plugins]]
            name = "b"
            fetcher = "file"
            port = 6000
            "#,
        );
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("already used by plugin 'a'"));
    }

    #[test]
    fn ephemeral_ports_never_collide() {
        let config = parse(
            r#"
            [[plugins]]
            name = "a"
            fetcher = "file"
            port = 0

            [[plugins]]
            name = "b"
            fetcher = "file"
            port = 0
            "#,
        );
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn empty_plugin_list_is_rejected() {
        let errors = validate_config(&AgentConfig::default()).unwrap_err();
        assert_eq!(errors[0].scope, "plugins");
    }

    #[test]
    fn startup_response_defaults_to_staleness_response() {
        let config = parse(&VALID.replace("default_response", "staleness_response = \"down\"\ndefault_response"));
        let compiled = compile_plugin("plugin 'web'", &config.plugins[0], &config.listener).unwrap();
        assert_eq!(compiled.startup_response.to_string(), "down");
        assert_eq!(compiled.listen_addr, "0.0.0.0:5556".parse().unwrap());
    }
}
