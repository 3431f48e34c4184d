//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate the first signal into a graceful shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Further signals while stopping are logged and ignored

use std::io;

use crate::lifecycle::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Received {
    Interrupt,
    Terminate,
}

impl Received {
    fn name(self) -> &'static str {
        match self {
            Received::Interrupt => "SIGINT",
            Received::Terminate => "SIGTERM",
        }
    }
}

/// Install handlers and trigger `shutdown` on the first signal.
///
/// Runs until the task is dropped; the caller aborts it once the agent has
/// stopped. Fails only if a handler cannot be installed.
pub async fn listen(shutdown: Shutdown) -> io::Result<()> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        #[cfg(unix)]
        let received = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Received::Interrupt
            }
            _ = terminate.recv() => Received::Terminate,
        };

        #[cfg(not(unix))]
        let received = {
            tokio::signal::ctrl_c().await?;
            Received::Interrupt
        };

        if shutdown.trigger() {
            tracing::info!(signal = received.name(), "Signal received, initiating graceful shutdown");
        } else {
            tracing::warn!(signal = received.name(), "Signal received, stop already in progress");
        }
    }
}
