//! Modbus RTU meter polling engine.
//!
//! Either sweeps the bus once for devices (`--scan`) or polls the
//! configured meters continuously, emitting decoded readings and per-device
//! status signals.

use anyhow::{Context, Result};
use clap::Parser;
use meterpoll::config::EngineConfig;
use meterpoll::executor::QueryExecutor;
use meterpoll::poll::PollingLoop;
use meterpoll::producer::default_producers;
use meterpoll::scan::BusScanner;
use meterpoll::scheduler::RequestScheduler;
use meterpoll::session::TransportSession;
use meterpoll::status::Status;
use meterpoll::{ControlKind, LoggingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Modbus RTU polling engine for multi-drop energy meter buses.
#[derive(Parser, Debug)]
#[command(name = "meterpoll")]
#[command(about = "Polls energy meters over a Modbus RTU serial bus")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "meterpoll.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Sweep the bus for devices once and exit.
    #[arg(long)]
    scan: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = EngineConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    meterpoll::init_tracing(&log_config)?;

    info!("Starting meterpoll");
    info!("Loaded configuration from {:?}", args.config);

    // Open the bus. Failure here is a fatal precondition.
    let session = TransportSession::connect(
        &config.device,
        config.comset,
        Duration::from_millis(config.timeout_ms),
    )
    .context("Failed to open the RTU bus")?;

    let status = Arc::new(Status::new());
    let mut executor = QueryExecutor::new(session, status.clone(), config.verbose);

    // One-shot discovery and steady-state polling both need the bus to
    // themselves, so they never run together.
    if args.scan {
        let producers = default_producers();
        let report = BusScanner::new(&mut executor, &producers).scan().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if config.meters.is_empty() {
        anyhow::bail!("No meters configured; nothing to poll (try --scan)");
    }

    let (request_tx, request_rx) = mpsc::channel(64);
    let (result_tx, mut result_rx) = mpsc::channel::<meterpoll::snip::QuerySnip>(64);
    let (control_tx, mut control_rx) = mpsc::channel::<meterpoll::snip::ControlSnip>(64);

    let scheduler = RequestScheduler::new(&config.meters, Duration::from_secs(config.cycle_secs));
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(async move {
        scheduler.run(request_tx).await;
    }));

    tasks.push(tokio::spawn(async move {
        while let Some(snip) = result_rx.recv().await {
            info!(
                "Device {} opcode {:#06x}: {:.3}",
                snip.device_id,
                snip.op_code,
                snip.value.unwrap_or(f64::NAN)
            );
        }
    }));

    tasks.push(tokio::spawn(async move {
        while let Some(control) = control_rx.recv().await {
            match control.kind {
                ControlKind::Ok => {}
                ControlKind::Error => error!("Device {}: {}", control.device_id, control.message),
            }
        }
    }));

    let poller = PollingLoop::new(executor, status.clone());
    tasks.push(tokio::spawn(async move {
        poller.run(request_rx, result_tx, control_tx).await;
        warn!("Polling loop stopped");
    }));

    info!("Polling {} meter(s)", config.meters.len());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    for task in tasks {
        task.abort();
    }

    info!(
        "Final status: {}",
        serde_json::to_string(&status.snapshot())?
    );

    Ok(())
}
