//! Startup orchestration.
//!
//! # Responsibilities
//! - Build one plugin instance per configured plugin
//! - Bind every listener before anything starts serving
//! - Start schedulers and responders, then stop them in order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, and is reported with every
//!   problem found rather than the first one
//! - Listeners bind before schedulers start, so a port conflict never
//!   leaves half an agent running
//! - Shutdown stops accepting, drains probes, then stops schedulers;
//!   a scheduler that outlives its stop_timeout is aborted

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::validation::{compile_plugin, plugin_scope, ValidationError};
use crate::config::AgentConfig;
use crate::fetch::FetcherRegistry;
use crate::health::{PluginInstance, Scheduler};
use crate::lifecycle::{signals, Shutdown};
use crate::net::{AgentServer, Listener, ListenerError};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Config(Vec<ValidationError>),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Compile rules and resolve fetchers for every configured plugin.
pub fn build_plugins(
    config: &AgentConfig,
    registry: &FetcherRegistry,
) -> Result<Vec<Arc<PluginInstance>>, StartupError> {
    let mut errors = Vec::new();
    let mut plugins = Vec::with_capacity(config.plugins.len());

    for (index, plugin) in config.plugins.iter().enumerate() {
        let scope = plugin_scope(index, plugin);
        let compiled = compile_plugin(&scope, plugin, &config.listener);
        let fetcher = registry
            .build(&plugin.fetcher, &plugin.params)
            .map_err(|e| ValidationError::new(&scope, e.to_string()));

        match (compiled, fetcher) {
            (Ok(compiled), Ok(fetcher)) => {
                plugins.push(Arc::new(PluginInstance::new(plugin, compiled, fetcher)));
            }
            (compiled, fetcher) => {
                if let Err(plugin_errors) = compiled {
                    errors.extend(plugin_errors);
                }
                if let Err(e) = fetcher {
                    errors.push(e);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(plugins)
    } else {
        Err(StartupError::Config(errors))
    }
}

/// A fully bound agent, ready to serve.
pub struct Agent {
    plugins: Vec<Arc<PluginInstance>>,
    servers: Vec<AgentServer>,
}

impl Agent {
    /// Build every plugin and bind every listener.
    pub async fn bind(config: &AgentConfig, registry: &FetcherRegistry) -> Result<Self, StartupError> {
        let plugins = build_plugins(config, registry)?;

        let mut servers = Vec::with_capacity(plugins.len());
        for plugin in &plugins {
            let listener = Listener::bind(plugin.listen_addr(), config.listener.max_connections).await?;
            servers.push(AgentServer::new(
                Arc::clone(plugin),
                listener,
                Duration::from_millis(config.listener.write_timeout_ms),
                Duration::from_secs(config.listener.shutdown_grace_secs),
            ));
        }

        Ok(Self { plugins, servers })
    }

    pub fn plugins(&self) -> &[Arc<PluginInstance>] {
        &self.plugins
    }

    pub fn plugin(&self, name: &str) -> Option<&Arc<PluginInstance>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    /// Bound address of the named plugin's listener.
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.plugins
            .iter()
            .zip(&self.servers)
            .find(|(plugin, _)| plugin.name() == name)
            .map(|(_, server)| server.local_addr())
    }

    /// Serve until `shutdown` fires, then stop everything.
    pub async fn run(self, shutdown: Shutdown) {
        let schedulers: Vec<(Arc<PluginInstance>, JoinHandle<()>)> = self
            .plugins
            .iter()
            .map(|plugin| {
                let handle = tokio::spawn(Scheduler::new(Arc::clone(plugin)).run(shutdown.clone()));
                (Arc::clone(plugin), handle)
            })
            .collect();

        let servers: Vec<(String, JoinHandle<Result<(), ListenerError>>)> = self
            .servers
            .into_iter()
            .zip(&self.plugins)
            .map(|(server, plugin)| (plugin.name().to_string(), tokio::spawn(server.run(shutdown.clone()))))
            .collect();

        tracing::info!(plugins = self.plugins.len(), "Agent running");
        shutdown.wait().await;
        let stopping = Instant::now();

        for (name, handle) in servers {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(plugin = %name, error = %e, "Responder failed"),
                Err(e) => tracing::error!(plugin = %name, error = %e, "Responder task panicked"),
            }
        }

        for (plugin, mut handle) in schedulers {
            let deadline = stopping + plugin.stop_timeout();
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                tracing::warn!(
                    plugin = %plugin.name(),
                    stop_timeout_secs = plugin.stop_timeout().as_secs(),
                    "Scheduler did not stop in time, aborting"
                );
                handle.abort();
            }
        }

        tracing::info!("Agent stopped");
    }
}

/// Start the agent described by `config` and run it until a signal arrives.
pub async fn start(config: AgentConfig, registry: FetcherRegistry) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse().map_err(|_| {
            StartupError::Config(vec![ValidationError::new(
                "observability",
                format!("invalid metrics_address '{}'", config.observability.metrics_address),
            )])
        })?;
        metrics::init_metrics(addr)?;
    }

    let agent = Agent::bind(&config, &registry).await?;
    for plugin in agent.plugins() {
        tracing::info!(
            plugin = %plugin.name(),
            fetcher = plugin.fetcher().kind(),
            address = ?agent.local_addr(plugin.name()),
            "Plugin ready"
        );
    }

    let shutdown = Shutdown::new();
    let mut signal_task = tokio::spawn(signals::listen(shutdown.clone()));

    let run = agent.run(shutdown.clone());
    tokio::pin!(run);

    let result = tokio::select! {
        _ = &mut run => Ok(()),
        installed = &mut signal_task => match installed {
            Ok(Err(e)) => {
                shutdown.trigger();
                run.await;
                Err(StartupError::Signals(e))
            }
            // The listener only returns on error.
            _ => {
                run.await;
                Ok(())
            }
        },
    };

    signal_task.abort();
    result
}
