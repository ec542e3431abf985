//! wifitak: bridges Kismet WiFi detections into Cursor-on-Target and
//! republishes them over TAK transports.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wifitak_cot::SystemClock;
use wifitak_kismet::{run_ingest, IngestConfig, KismetSource};
use wifitak_transport::{run_dispatch, DispatchConfig};

#[derive(Debug, Parser)]
#[command(name = "wifitak", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/config.yaml", env = "WIFITAK_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    info!(
        config = %args.config.display(),
        senders = config.senders.len(),
        "starting wifitak"
    );

    let senders = config
        .senders
        .iter()
        .map(|sender_config| sender_config.build())
        .collect::<Result<Vec<_>, _>>()
        .context("failed to construct a sender")?;

    let (tx, rx) = flume::bounded(config.pipeline.queue_depth);
    let cancel = CancellationToken::new();

    let source = KismetSource::new(
        config.kismet.connection.clone(),
        config.kismet.fields.clone(),
    );
    let ingest_config = IngestConfig {
        retry_interval: Duration::from_secs(config.kismet.retry_secs),
        stale_window_secs: config.kismet.stale_secs,
    };

    let mut ingest = tokio::spawn(run_ingest(
        source,
        config.kismet.fields.clone(),
        ingest_config,
        Arc::new(SystemClock),
        tx,
        cancel.clone(),
    ));

    let dispatch = tokio::spawn(run_dispatch(
        rx,
        senders,
        DispatchConfig {
            relay_depth: config.pipeline.relay_depth,
            retry_interval: Duration::from_secs(config.pipeline.retry_secs),
        },
        cancel.clone(),
    ));

    let ingest_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            cancel.cancel();
            (&mut ingest).await
        }
        result = &mut ingest => {
            cancel.cancel();
            result
        }
    };

    let dispatch_stats = dispatch.await.context("dispatcher task panicked")?;
    info!(?dispatch_stats, "dispatcher finished");

    match ingest_result.context("ingestion task panicked")? {
        Ok(stats) => {
            info!(?stats, "ingestion finished");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "ingestion failed");
            Err(e).context("ingestion failed")
        }
    }
}
