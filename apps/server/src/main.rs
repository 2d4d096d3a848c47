//! txproto-server - headless driver binary for the txproto-core pipeline
//! runtime.
//!
//! Builds a demux -> decode -> encode -> mux demo pipeline (against the
//! loopback [`txproto_core::media_ops::mock::MockMediaOps`] backend,
//! since this crate carries no real codec dependency), commits it, and
//! runs until asked to shut down, at which point it runs the discard
//! pass in reverse link order.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use txproto_core::bootstrap::bootstrap_demo_pipeline;
use txproto_core::media_ops::mock::MockMediaOps;

use crate::config::ServerConfig;

/// txproto-server - headless driver for the component graph runtime.
#[derive(Parser, Debug)]
#[command(name = "txproto-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "TXPROTO_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Input endpoint URI (overrides config file).
    #[arg(short, long, env = "TXPROTO_INPUT_URI")]
    input: Option<String>,

    /// Output endpoint URI (overrides config file).
    #[arg(short, long, env = "TXPROTO_OUTPUT_URI")]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("txproto-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(input) = args.input {
        config.input_uri = input;
    }
    if let Some(output) = args.output {
        config.output_uri = output;
    }

    txproto_core::wire::Endpoint::parse(&config.input_uri)
        .context("invalid input_uri in configuration")?;
    txproto_core::wire::Endpoint::parse(&config.output_uri)
        .context("invalid output_uri in configuration")?;

    log::info!(
        "configuration: input={} output={} decoder={} encoder={} mux={}",
        config.input_uri,
        config.output_uri,
        config.decoder_codec,
        config.encoder_codec,
        config.mux_format,
    );

    let pipeline = bootstrap_demo_pipeline(Arc::new(MockMediaOps))
        .context("failed to build demo pipeline")?;
    log::info!(
        "pipeline wired: {} components registered",
        pipeline.ctx.component_count()
    );

    let report = pipeline.ctx.commit.commit();
    if !report.is_ok() {
        for (name, err) in &report.failed {
            log::error!("commit handler {name} failed: {err}");
        }
        anyhow::bail!("pipeline commit failed");
    }
    log::info!("pipeline committed");

    pipeline.ctx.io.spawn_discovery(std::time::Duration::from_secs(
        config.discovery_interval_secs,
    ));

    shutdown_signal().await;
    log::info!("shutdown signal received, discarding pipeline");

    let report = pipeline.ctx.commit.discard();
    for (name, err) in &report.failed {
        log::warn!("discard handler {name} failed: {err}");
    }
    pipeline.ctx.io.stop();

    log::info!("shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
