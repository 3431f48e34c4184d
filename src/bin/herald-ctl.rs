use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use herald::config::{load_config, ConfigOverrides};
use herald::fetch::FetcherRegistry;
use herald::health::Scheduler;
use herald::lifecycle::build_plugins;

#[derive(Parser)]
#[command(name = "herald-ctl")]
#[command(about = "Inspect a running herald agent or a configuration file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to an agent port like a load balancer and print its answer
    Probe {
        addr: SocketAddr,

        /// Seconds to wait for the answer
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },
    /// Validate a configuration file and list its plugins
    Check {
        config: PathBuf,

        /// Also run one check cycle per plugin and print the result
        #[arg(long)]
        fetch: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Probe { addr, timeout } => probe(addr, Duration::from_secs(timeout)).await,
        Commands::Check { config, fetch } => check(config, fetch).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn probe(addr: SocketAddr, timeout: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let read = async {
        let mut stream = TcpStream::connect(addr).await?;
        let mut answer = String::new();
        stream.read_to_string(&mut answer).await?;
        Ok::<_, std::io::Error>(answer)
    };

    let answer = tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| format!("no answer from {} within {:?}", addr, timeout))??;
    print!("{}", answer);
    Ok(())
}

async fn check(path: PathBuf, fetch: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&path, &ConfigOverrides::default())?;
    let plugins = build_plugins(&config, &FetcherRegistry::builtin())?;

    println!("{}: {} plugin(s)", path.display(), plugins.len());
    for plugin in plugins {
        println!(
            "  {:<20} {:<6} {:<22} every {}s",
            plugin.name(),
            plugin.fetcher().kind(),
            plugin.listen_addr(),
            plugin.interval().as_secs()
        );

        if fetch {
            let entry = Scheduler::new(Arc::clone(&plugin)).tick().await;
            match &entry.last_error {
                Some(e) => println!("    -> {} ({})", entry.response, e),
                None => println!(
                    "    -> {} (metric: {})",
                    entry.response,
                    entry.metric.map_or_else(|| "-".to_string(), |m| m.to_string())
                ),
            }
        }
    }
    Ok(())
}
