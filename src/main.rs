// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! CycleWatch - Streaming appliance cycle monitor
//!
//! Polls a power-reading source for one appliance, segments the stream into
//! ON/OFF cycles and reports cycles whose average power is abnormal.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cyclewatch::ingest::{powers, read_csv, CsvLayout, DEFAULT_LABEL_COLUMN};
use cyclewatch::labeler::{evaluate, fit_labeler, Metric};
use cyclewatch::{Config, Monitor, NAME, VERSION};

/// CycleWatch - Streaming appliance cycle monitor
#[derive(Parser, Debug)]
#[command(name = "cyclewatch")]
#[command(version = VERSION)]
#[command(about = "ON/OFF cycle segmentation and anomaly detection for appliance power telemetry")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with a simulated appliance
    #[arg(long)]
    demo: bool,

    /// CSV of normal operation used for training
    #[arg(long)]
    training: Option<PathBuf>,

    /// Directory watched for new CSV batches
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    /// Anomaly-intake URL
    #[arg(long)]
    notify_url: Option<String>,

    /// Score the trained labeler against a labelled CSV and exit
    #[arg(long)]
    evaluate: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    init_logging(&args, &config.log_level)?;
    info!("{} v{}", NAME, VERSION);
    info!("Configuration loaded from {:?}", config_path);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(training) = args.training {
        config.device.training_file = Some(training);
    }
    if let Some(dir) = args.watch_dir {
        config.ingestion.watch_dir = Some(dir);
    }
    if let Some(url) = args.notify_url {
        config.notification.endpoint = Some(url);
    }

    if let Some(labelled) = args.evaluate {
        return run_evaluation(&config, &labelled);
    }

    info!("Demo mode: {}", config.demo_mode);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config))
}

fn init_logging(args: &Args, configured: &str) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .init();
        return Ok(());
    }

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        configured.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Train the configured labeler and print its scores on a labelled trace
fn run_evaluation(config: &Config, labelled: &Path) -> Result<()> {
    let device = &config.device;
    let Some(training_file) = &device.training_file else {
        bail!("--evaluate needs a training file (--training or device.training_file)");
    };

    let layout = CsvLayout::new(&device.timestamp_column, &device.column)
        .with_mapping(device.mapping.clone());
    let training = powers(&read_csv(training_file, &layout)?);
    let labeler = fit_labeler(config.labeler.kind, &training, config.labeler.fit_options())?;

    let rows = read_csv(labelled, &layout.with_label_column(DEFAULT_LABEL_COLUMN))
        .with_context(|| format!("reading labelled trace {:?}", labelled))?;
    let mut scored = Vec::with_capacity(rows.len());
    let mut truth = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(label) = row.label {
            scored.push(row.sample.power);
            truth.push(label);
        }
    }

    info!("Evaluating {} labeler on {} labelled samples", labeler.name(), truth.len());
    for metric in [Metric::Accuracy, Metric::Precision, Metric::F1] {
        let score = evaluate(labeler.as_ref(), &scored, &truth, metric)?;
        println!("{:?}: {:.4}", metric, score);
    }
    Ok(())
}

/// Run the monitor until Ctrl+C
async fn run_headless(config: Config) -> Result<()> {
    let mut monitor = Monitor::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, cleaning up..."),
            Err(e) => warn!("Cannot listen for Ctrl+C ({}); shutting down", e),
        }
        let _ = shutdown_tx.send(true);
    });

    info!("{} running for {}", NAME, monitor.device_label());
    info!("   Press Ctrl+C to shutdown");

    let stats = monitor.run(shutdown_rx).await;

    info!(
        "{} shutdown complete: {} cycles, {} anomalies",
        NAME, stats.cycles, stats.anomalies
    );
    Ok(())
}
