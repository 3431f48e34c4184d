//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Listener defaults shared by every plugin instance.
    pub listener: ListenerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Plugin instances, one listening port each.
    pub plugins: Vec<PluginConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Default bind address for plugins that do not set `bind`.
    pub bind: String,

    /// Default port for plugins that do not set `port`.
    pub port: u16,

    /// Maximum concurrent probe connections per listener (backpressure).
    pub max_connections: usize,

    /// Deadline for writing the response line to a probe.
    pub write_timeout_ms: u64,

    /// How long in-flight probes may take to finish during shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5555,
            max_connections: 1024,
            write_timeout_ms: 2000,
            shutdown_grace_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
        }
    }
}

/// What the scheduler publishes when the payload was fetched but the
/// metric could not be extracted from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ExtractionFailure {
    /// Keep the previous response; staleness eventually takes over.
    #[default]
    #[serde(rename = "keep")]
    KeepPrevious,

    /// Publish `default_response` as a fresh result.
    #[serde(rename = "default")]
    DefaultResponse,
}

/// One plugin instance: fetch strategy, rules and listening address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
    /// Unique instance name.
    pub name: String,

    /// Fetch strategy name (`http`, `file`).
    #[serde(alias = "herald_plugin_name")]
    pub fetcher: String,

    /// Strategy parameters, e.g. `{ url = "..." }` or `{ path = "..." }`.
    #[serde(default)]
    pub params: toml::Table,

    /// Bind address; falls back to `listener.bind`.
    #[serde(default)]
    pub bind: Option<String>,

    /// Listening port; falls back to `listener.port`.
    #[serde(default)]
    pub port: Option<u16>,

    /// Parse the payload as JSON before extracting metrics.
    #[serde(default)]
    pub is_json: bool,

    /// Fetch period in seconds.
    #[serde(default = "default_interval", alias = "interval")]
    pub interval_secs: u64,

    /// Maximum age of a result in seconds before it is stale. 0 disables.
    #[serde(default, alias = "staleness_interval")]
    pub staleness_interval_secs: u64,

    /// Served instead of a stale result.
    #[serde(default = "default_noop")]
    pub staleness_response: toml::Value,

    /// Served before the first fetch completes; defaults to
    /// `staleness_response`.
    #[serde(default)]
    pub startup_response: Option<toml::Value>,

    /// Fetch deadline and scheduler stop deadline, in seconds.
    #[serde(default = "default_stop_timeout", alias = "stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Expression producing the numeric threshold metric.
    #[serde(default = "default_metric")]
    pub thresholds_metric: String,

    /// Ordered threshold rules.
    #[serde(default)]
    pub thresholds: Vec<toml::Table>,

    /// Expression producing the text matched by pattern rules.
    #[serde(default = "default_metric")]
    pub patterns_metric: String,

    /// Ordered pattern rules.
    #[serde(default)]
    pub patterns: Vec<toml::Table>,

    /// Served when no rule matches.
    #[serde(default = "default_noop")]
    pub default_response: toml::Value,

    #[serde(default)]
    pub extraction_failure: ExtractionFailure,
}

fn default_interval() -> u64 {
    5
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_metric() -> String {
    "r".to_string()
}

fn default_noop() -> toml::Value {
    toml::Value::String("noop".to_string())
}
