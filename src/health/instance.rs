//! One configured plugin: its fetcher, rules, policy and cache cell.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::validation::CompiledPlugin;
use crate::config::{ExtractionFailure, PluginConfig};
use crate::fetch::Fetcher;
use crate::health::pipeline::Pipeline;
use crate::health::staleness::{Decision, StalenessPolicy};
use crate::health::state::{CacheCell, CacheEntry, PipelineError};
use crate::rules::Evaluation;

#[derive(Debug)]
pub struct PluginInstance {
    name: String,
    listen_addr: SocketAddr,
    fetcher: Arc<dyn Fetcher>,
    pipeline: Pipeline,
    staleness: StalenessPolicy,
    interval: Duration,
    stop_timeout: Duration,
    extraction_failure: ExtractionFailure,
    cache: CacheCell,
}

impl PluginInstance {
    pub fn new(config: &PluginConfig, compiled: CompiledPlugin, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            name: config.name.clone(),
            listen_addr: compiled.listen_addr,
            fetcher,
            pipeline: Pipeline::new(config.is_json, compiled.rules),
            staleness: StalenessPolicy::new(
                config.staleness_interval_secs,
                compiled.staleness_response,
                compiled.startup_response,
            ),
            interval: Duration::from_secs(config.interval_secs),
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
            extraction_failure: config.extraction_failure,
            cache: CacheCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    pub fn snapshot(&self) -> Arc<CacheEntry> {
        self.cache.snapshot()
    }

    /// Publish the outcome of one check cycle.
    ///
    /// Extraction failures either keep the previous response or publish the
    /// default response, depending on `extraction_failure`. Every other
    /// failure keeps the previous response.
    pub fn record(&self, outcome: Result<Evaluation, PipelineError>, now: Instant) -> Arc<CacheEntry> {
        let previous = self.cache.snapshot();
        let next = match outcome {
            Ok(evaluation) => previous.succeeded(evaluation, now),
            Err(error @ PipelineError::Extraction(_))
                if self.extraction_failure == ExtractionFailure::DefaultResponse =>
            {
                previous.defaulted(self.pipeline.rules().default_response(), error, now)
            }
            Err(error) => previous.failed(error),
        };
        self.cache.publish(next);
        self.cache.snapshot()
    }

    /// The answer a probe arriving at `now` receives.
    pub fn respond(&self, now: Instant) -> Decision {
        self.staleness.evaluate(&self.cache.snapshot(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validation::compile_plugin;
    use crate::config::AgentConfig;
    use crate::fetch::file::FileFetcher;
    use crate::health::staleness::Freshness;

    fn instance(extra: &str) -> PluginInstance {
        let config: AgentConfig = toml::from_str(&format!(
            r#"
            [[plugins]]
            name = "web"
            fetcher = "file"
            port = 0
            is_json = true
            staleness_interval = 10
            staleness_response = "down"
            thresholds_metric = "r['load']"
            thresholds = [{{ drain = ">=90" }}, {{ up = "<90" }}]
            default_response = "maint"
            {}
            "#,
            extra
        ))
        .unwrap();
        let plugin = &config.plugins[0];
        let compiled = compile_plugin("plugin 'web'", plugin, &config.listener).unwrap();
        PluginInstance::new(plugin, compiled, Arc::new(FileFetcher::new("/nonexistent")))
    }

    #[test]
    fn serves_startup_response_until_first_result() {
        let plugin = instance("");
        let decision = plugin.respond(Instant::now());
        assert_eq!(decision.response.to_string(), "down");
        assert_eq!(decision.freshness, Freshness::NeverFetched);
    }

    #[test]
    fn fresh_result_is_served_then_goes_stale() {
        let plugin = instance("");
        let now = Instant::now();
        plugin.record(plugin.pipeline().process(r#"{"load": 95}"#), now);

        assert_eq!(plugin.respond(now).response.to_string(), "drain");
        assert_eq!(
            plugin.respond(now + Duration::from_secs(11)).response.to_string(),
            "down"
        );

        // The next success revives it.
        let later = now + Duration::from_secs(12);
        plugin.record(plugin.pipeline().process(r#"{"load": 10}"#), later);
        assert_eq!(plugin.respond(later).response.to_string(), "up");
    }

    #[test]
    fn extraction_failure_keeps_previous_by_default() {
        let plugin = instance("");
        let now = Instant::now();
        plugin.record(plugin.pipeline().process(r#"{"load": 95}"#), now);
        let entry = plugin.record(plugin.pipeline().process(r#"{"other": 1}"#), now);

        assert_eq!(entry.response.to_string(), "drain");
        assert!(entry.last_error.is_some());
    }

    #[test]
    fn extraction_failure_can_publish_default() {
        let plugin = instance("extraction_failure = \"default\"");
        let now = Instant::now();
        plugin.record(plugin.pipeline().process(r#"{"load": 95}"#), now);
        let entry = plugin.record(plugin.pipeline().process(r#"{"other": 1}"#), now);

        assert_eq!(entry.response.to_string(), "maint");
        assert_eq!(plugin.respond(now).freshness, Freshness::Fresh);
    }

    #[test]
    fn parse_failure_always_keeps_previous() {
        let plugin = instance("extraction_failure = \"default\"");
        let now = Instant::now();
        plugin.record(plugin.pipeline().process(r#"{"load": 10}"#), now);
        let entry = plugin.record(plugin.pipeline().process("not json"), now);
        assert_eq!(entry.response.to_string(), "up");
    }
}
