//! Telemetry gateway binary entry point.
//!
//! Loads configuration, connects the broker registry, starts the worker
//! pool and dispatcher, and serves the websocket ingress until an OS
//! signal requests shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use edge_telemetry_gateway::broker::build_registry;
use edge_telemetry_gateway::{Config, Dispatcher};
use mimalloc::MiMalloc;

/// Global allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "telemetry-gatewayd")]
#[command(about = "Edge telemetry gateway: ingest device messages, fan out to brokers")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "CONFIG_PATH", default_value = "config.yaml")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        log::error!("fatal: {err:?}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    log::info!(
        "starting telemetry gateway: {} broker(s), queueSize={}, maxWorkers={}",
        config.telemetry_agent.brokers.len(),
        config.telemetry_agent.queue_size,
        config.telemetry_agent.max_workers,
    );

    let registry = build_registry(&config.telemetry_agent.brokers)
        .await
        .context("failed to build broker registry")?;

    let dispatcher = Arc::new(Dispatcher::new(
        config.telemetry_agent.queue_size,
        config.telemetry_agent.max_workers,
        registry,
    ));
    dispatcher.start_worker_pool().await;
    dispatcher.start().await;

    let addr: SocketAddr = config
        .api_service
        .address
        .parse()
        .with_context(|| format!("invalid apiService.address: {}", config.api_service.address))?;

    let ingress_dispatcher = Arc::clone(&dispatcher);
    let ingress_handle = tokio::spawn(async move {
        if let Err(err) = edge_telemetry_gateway::ingress::serve(addr, ingress_dispatcher).await {
            log::error!("ingress stopped: {err:?}");
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    log::info!("shutdown signal received, draining in-flight publishes...");

    ingress_handle.abort();
    dispatcher.shutdown().await;
    log::info!("shutdown complete");

    Ok(())
}
