//! HTTP GET fetch strategy.
//!
//! Params: `url` (required), `user_agent` (optional).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::fetch::{string_param, FetchError, Fetcher, FetcherConfigError};

const DEFAULT_USER_AGENT: &str = concat!("herald/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
pub struct HttpFetcher {
    url: Url,
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(url: Url, user_agent: &str) -> Result<Self, FetcherConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetcherConfigError::InvalidParam {
                param: "user_agent",
                message: e.to_string(),
            })?;
        Ok(Self { url, client })
    }

    pub fn from_params(params: &toml::Table) -> Result<Arc<dyn Fetcher>, FetcherConfigError> {
        let raw = string_param(params, &["url"])?;
        let url = Url::parse(raw).map_err(|e| FetcherConfigError::InvalidParam {
            param: "url",
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetcherConfigError::InvalidParam {
                param: "url",
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let user_agent = match params.get("user_agent") {
            Some(_) => string_param(params, &["user_agent"])?,
            None => DEFAULT_USER_AGENT,
        };

        Ok(Arc::new(Self::new(url, user_agent)?))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, timeout: Duration) -> Result<String, FetchError> {
        let response = self
            .client
            .get(self.url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| classify(e, timeout))?;
        tracing::trace!(url = %self.url, bytes = body.len(), "Fetched payload");
        Ok(body)
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Transport(error.to_string())
    }
}
