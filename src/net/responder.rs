//! Agent-check responder.
//!
//! # Responsibilities
//! - Run the accept loop for one plugin's listener
//! - Answer every probe with exactly one line and close
//! - Stop accepting on shutdown and let in-flight probes finish
//!
//! # Design Decisions
//! - Each probe runs on its own task; a slow peer never blocks accept
//! - The answer is computed from a cache snapshot, never from a fetch
//! - Writes are bounded by `write_timeout`; failures stay local to one probe

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::health::PluginInstance;
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionId, ConnectionTracker};
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Failure to deliver one answer.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

pub struct AgentServer {
    plugin: Arc<PluginInstance>,
    listener: Listener,
    tracker: ConnectionTracker,
    write_timeout: Duration,
    shutdown_grace: Duration,
}

impl AgentServer {
    pub fn new(
        plugin: Arc<PluginInstance>,
        listener: Listener,
        write_timeout: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            plugin,
            listener,
            tracker: ConnectionTracker::new(),
            write_timeout,
            shutdown_grace,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Serve probes until `shutdown` fires, then drain.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ListenerError> {
        let AgentServer {
            plugin,
            listener,
            tracker,
            write_timeout,
            shutdown_grace,
        } = self;

        tracing::info!(
            plugin = %plugin.name(),
            address = %listener.local_addr(),
            "Responder accepting probes"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let guard = tracker.track();
                        let plugin = Arc::clone(&plugin);
                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(e) = answer_probe(&plugin, stream, write_timeout).await {
                                metrics::record_probe_write_error(plugin.name());
                                tracing::warn!(
                                    plugin = %plugin.name(),
                                    peer_addr = %peer_addr,
                                    connection_id = %guard.id(),
                                    error = %e,
                                    "Failed to answer probe"
                                );
                            } else {
                                log_answered(&plugin, peer_addr, guard.id());
                            }
                        });
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(plugin = %plugin.name(), error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        let local_addr = listener.local_addr();
        drop(listener);
        tracing::info!(plugin = %plugin.name(), address = %local_addr, "Listener closed, draining probes");

        let remaining = tracker.wait_for_drain(shutdown_grace).await;
        if remaining > 0 {
            tracing::warn!(plugin = %plugin.name(), remaining, "Shutdown grace elapsed with probes in flight");
        }
        Ok(())
    }
}

fn log_answered(plugin: &PluginInstance, peer_addr: SocketAddr, connection_id: ConnectionId) {
    tracing::debug!(
        plugin = %plugin.name(),
        peer_addr = %peer_addr,
        connection_id = %connection_id,
        "Probe answered"
    );
}

/// Write the current answer of `plugin` to `stream` as one line.
pub async fn answer_probe(
    plugin: &PluginInstance,
    mut stream: TcpStream,
    write_timeout: Duration,
) -> Result<(), ProbeError> {
    let decision = plugin.respond(Instant::now());
    let stale = decision.freshness.is_stale();
    metrics::record_probe(plugin.name(), stale);
    if stale {
        tracing::warn!(
            plugin = %plugin.name(),
            freshness = ?decision.freshness,
            response = %decision.response,
            "Serving stale response"
        );
    }

    let line = format!("{}\n", decision.response);
    let write = async {
        stream.write_all(line.as_bytes()).await?;
        stream.shutdown().await
    };
    match tokio::time::timeout(write_timeout, write).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProbeError::Timeout(write_timeout)),
    }
}
