//! Periodic checking.
//!
//! # Responsibilities
//! - Run one fetch → extract → resolve cycle per interval
//! - Publish every outcome to the plugin's cache cell
//! - Never fail outward: errors are logged, counted and recorded

use std::sync::Arc;
use std::time::Instant;

use tokio::time::{self, MissedTickBehavior};

use crate::fetch::FetchError;
use crate::health::instance::PluginInstance;
use crate::health::state::{CacheEntry, PipelineError};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

pub struct Scheduler {
    plugin: Arc<PluginInstance>,
}

impl Scheduler {
    pub fn new(plugin: Arc<PluginInstance>) -> Self {
        Self { plugin }
    }

    pub async fn run(self, shutdown: Shutdown) {
        tracing::info!(
            plugin = %self.plugin.name(),
            fetcher = self.plugin.fetcher().kind(),
            interval_secs = self.plugin.interval().as_secs(),
            "Scheduler starting"
        );

        let mut ticker = time::interval(self.plugin.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.wait() => {
                    tracing::info!(plugin = %self.plugin.name(), "Scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one check cycle and publish its outcome.
    pub async fn tick(&self) -> Arc<CacheEntry> {
        let plugin = &self.plugin;
        let started = Instant::now();

        // Strategies get the deadline too, but it is enforced here.
        let deadline = plugin.stop_timeout();
        let outcome = match time::timeout(deadline, plugin.fetcher().fetch(deadline)).await {
            Ok(Ok(payload)) => plugin.pipeline().process(&payload),
            Ok(Err(e)) => Err(PipelineError::Fetch(e.to_string())),
            Err(_) => Err(PipelineError::Fetch(FetchError::Timeout(deadline).to_string())),
        };

        let label = match &outcome {
            Ok(evaluation) => {
                if let Some(value) = evaluation.metric {
                    metrics::record_metric_value(plugin.name(), value);
                }
                tracing::debug!(
                    plugin = %plugin.name(),
                    metric = ?evaluation.metric,
                    response = %evaluation.response,
                    "Check succeeded"
                );
                "success"
            }
            Err(e) => {
                tracing::warn!(plugin = %plugin.name(), error = %e, "Check failed");
                e.kind()
            }
        };
        metrics::record_fetch(plugin.name(), label, started.elapsed());

        plugin.record(outcome, Instant::now())
    }
}
