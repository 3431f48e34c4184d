//! herald, a load-balancer agent-check health agent.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                   HERALD                      │
//!                      │                                               │
//!   stats endpoint /   │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!   state file  ◀──────┼──│ fetcher │◀──│scheduler │──▶│ pipeline  │  │
//!                      │  └─────────┘   └──────────┘   │ decode    │  │
//!                      │                               │ extract   │  │
//!                      │                               │ resolve   │  │
//!                      │                               └─────┬─────┘  │
//!                      │                                     ▼        │
//!                      │                               ┌───────────┐  │
//!                      │                               │ CacheCell │  │
//!                      │                               └─────┬─────┘  │
//!                      │                                     ▼        │
//!   load balancer      │  ┌──────────┐   ┌───────────┐  ┌─────────┐  │
//!   agent-check ───────┼─▶│ listener │──▶│ responder │◀─│staleness│  │
//!               ◀──────┼──│          │   │ one line  │  └─────────┘  │
//!                      │  └──────────┘   └───────────┘               │
//!                      └──────────────────────────────────────────────┘
//! ```
//!
//! One scheduler and one listener run per configured plugin.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use herald::config::{load_config, ConfigOverrides, LogFormat};
use herald::fetch::FetcherRegistry;
use herald::lifecycle::start;
use herald::observability::logging;

#[derive(Debug, Parser)]
#[command(name = "herald", version, about = "Load balancer agent-check health agent")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/herald/config.toml")]
    config: PathBuf,

    /// Default bind address for plugins without their own
    #[arg(short, long)]
    bind: Option<String>,

    /// Default port for plugins without their own
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level
    #[arg(short, long, value_parser = ["error", "warn", "info", "debug", "trace"])]
    log_level: Option<String>,

    /// Log output format; overrides the configuration file
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let overrides = ConfigOverrides {
        bind: args.bind,
        port: args.port,
        log_level: args.log_level,
    };

    let mut config = match load_config(&args.config, &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("herald: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(format) = args.log_format {
        config.observability.log_format = format;
    }

    if let Err(e) = logging::init(&config.observability.log_level, config.observability.log_format) {
        eprintln!("herald: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        plugins = config.plugins.len(),
        "herald starting"
    );

    match start(config, FetcherRegistry::builtin()).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "herald failed");
            ExitCode::FAILURE
        }
    }
}
