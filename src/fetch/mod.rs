//! Fetch strategies.
//!
//! # Data Flow
//! ```text
//! [plugins] fetcher = "http", params = { ... }
//!     → FetcherRegistry::build (name → factory, at startup)
//!     → Arc<dyn Fetcher>
//!     → scheduler calls fetch(timeout) once per interval
//! ```
//!
//! # Design Decisions
//! - Strategies are registered explicitly, never discovered at runtime
//! - Unknown strategy names are rejected before anything starts
//! - A fetch only produces text; parsing belongs to the pipeline

pub mod file;
pub mod http;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A failed fetch. Always recoverable: the scheduler records it and retries
/// on the next tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid strategy name or parameters, found at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetcherConfigError {
    #[error("unknown fetcher '{name}' (known: {known})")]
    Unknown { name: String, known: String },

    #[error("missing parameter '{0}'")]
    MissingParam(&'static str),

    #[error("invalid parameter '{param}': {message}")]
    InvalidParam { param: &'static str, message: String },
}

/// Source of the raw health signal for one plugin instance.
#[async_trait]
pub trait Fetcher: Send + Sync + fmt::Debug {
    /// Strategy name, for logs.
    fn kind(&self) -> &'static str;

    /// Produce the current payload, giving up after `timeout`.
    async fn fetch(&self, timeout: Duration) -> Result<String, FetchError>;
}

/// Builds a fetcher from the instance's `params` table.
pub type FetcherFactory = fn(&toml::Table) -> Result<Arc<dyn Fetcher>, FetcherConfigError>;

/// Name → factory mapping consulted at startup.
#[derive(Clone)]
pub struct FetcherRegistry {
    factories: BTreeMap<String, FetcherFactory>,
}

impl FetcherRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `http` and `file` strategies.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("http", http::HttpFetcher::from_params);
        registry.register("herald_http", http::HttpFetcher::from_params);
        registry.register("file", file::FileFetcher::from_params);
        registry.register("herald_file", file::FileFetcher::from_params);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: FetcherFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn build(&self, name: &str, params: &toml::Table) -> Result<Arc<dyn Fetcher>, FetcherConfigError> {
        let factory = self.factories.get(name).ok_or_else(|| FetcherConfigError::Unknown {
            name: name.to_string(),
            known: self.factories.keys().cloned().collect::<Vec<_>>().join(", "),
        })?;
        factory(params)
    }
}

impl Default for FetcherRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// Read a required string parameter, accepting any of `names`.
pub(crate) fn string_param<'a>(
    params: &'a toml::Table,
    names: &[&'static str],
) -> Result<&'a str, FetcherConfigError> {
    for name in names {
        match params.get(*name) {
            Some(toml::Value::String(s)) if !s.trim().is_empty() => return Ok(s),
            Some(_) => {
                return Err(FetcherConfigError::InvalidParam {
                    param: *name,
                    message: "expected a non-empty string".to_string(),
                })
            }
            None => continue,
        }
    }
    Err(FetcherConfigError::MissingParam(names[0]))
}
