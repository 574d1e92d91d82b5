//! Main entry point for the kalshi-collector CLI

use anyhow::Context;
use clap::Parser;
use kalshi_collector::cli::{Cli, Commands};
use kalshi_collector::metrics;
use kalshi_collector::shutdown::{SharedShutdown, ShutdownCoordinator};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kalshi_collector=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: Cli, shutdown: SharedShutdown) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        metrics::init_metrics(addr).context("starting metrics exporter")?;
    }

    match cli.command {
        Commands::Get(ref args) => args.execute(&cli).await.context("get failed"),
        Commands::Collect(ref args) => args
            .execute(&cli, shutdown)
            .await
            .context("collect failed"),
        Commands::Stream(ref args) => args.execute(&cli, shutdown).await.context("stream failed"),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - stopping after the current step...");
                shutdown.request_shutdown();
            }
        }
    });

    if let Err(e) = run(cli, shutdown).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
