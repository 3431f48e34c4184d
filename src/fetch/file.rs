//! File read fetch strategy.
//!
//! Params: `path` (alias `file_path`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::fetch::{string_param, FetchError, Fetcher, FetcherConfigError};

#[derive(Debug)]
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_params(params: &toml::Table) -> Result<Arc<dyn Fetcher>, FetcherConfigError> {
        let path = string_param(params, &["path", "file_path"])?;
        Ok(Arc::new(Self::new(path)))
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn fetch(&self, timeout: Duration) -> Result<String, FetchError> {
        match tokio::time::timeout(timeout, tokio::fs::read_to_string(&self.path)).await {
            Ok(Ok(contents)) => {
                tracing::trace!(path = %self.path.display(), bytes = contents.len(), "Read payload");
                Ok(contents)
            }
            Ok(Err(e)) => Err(FetchError::Io(e)),
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }
}
