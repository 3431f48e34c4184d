//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, apply command-line overrides)
//!     → validation.rs (semantic checks, rule compilation)
//!     → AgentConfig (validated, immutable)
//!     → lifecycle::startup builds one PluginInstance per [[plugins]] entry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError, ConfigOverrides};
pub use schema::AgentConfig;
pub use schema::ExtractionFailure;
pub use schema::ListenerConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::PluginConfig;
