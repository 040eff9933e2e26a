//! Gaze confusion detector - replays a point trace through the pipeline
//!
//! Flags UI zones where a user's gaze lingers and keeps coming back, a
//! proxy for confusion on checkout-style pages.
//!
//! Module structure:
//! - `domain/` - Core value types (Point, Bounds, events, zone metrics)
//! - `io/` - External interfaces (trace replay, event egress, snapshots)
//! - `services/` - Business logic (registry, detector, aggregator, evaluator, pipeline)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use gaze_confusion::infra::{Config, Metrics};
use gaze_confusion::io::{write_snapshot, EventEgress, TraceReader};
use gaze_confusion::services::Pipeline;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Gaze confusion detector - zone dwell and revisit analysis
#[derive(Parser, Debug)]
#[command(name = "gaze-confusion", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// JSONL point trace to replay
    #[arg(short, long)]
    trace: String,

    /// Write the final session snapshot (pretty JSON) to this path
    #[arg(short, long)]
    snapshot: Option<String>,

    /// Override the egress file from the config (enables egress)
    #[arg(short, long)]
    egress: Option<String>,

    /// Pace the replay by the trace timestamps
    #[arg(long)]
    realtime: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-transition detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        git_hash = %env!("GIT_HASH"),
        "gaze-confusion starting"
    );

    let args = Args::parse();

    let mut config = Config::load_from_path(&args.config);
    let egress_enabled = config.egress_enabled() || args.egress.is_some();
    if let Some(ref file) = args.egress {
        config = config.with_egress_file(file.as_str());
    }

    info!(
        config_file = %config.config_file(),
        label = %config.session_label(),
        zones = %config.zones().len(),
        dwell_threshold_ms = %config.thresholds().dwell_ms,
        revisit_threshold = %config.thresholds().revisit_count,
        cadence = ?config.evaluation_cadence(),
        egress_enabled = %egress_enabled,
        egress_file = %config.egress_file(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let pipeline = Arc::new(Pipeline::new(&config, metrics.clone())?);

    // Egress subscribers live for the whole run
    let _egress_subscriptions = if egress_enabled {
        let egress = Arc::new(EventEgress::new(config.egress_file(), &pipeline.session_id()));
        let zone_egress = egress.clone();
        let zone_sub = pipeline.on_zone_event(move |e| {
            zone_egress.write_zone_event(e);
            Ok(())
        });
        let confusion_sub = pipeline.on_confusion_event(move |e| {
            egress.write_confusion_event(e);
            Ok(())
        });
        Some((zone_sub, confusion_sub))
    } else {
        None
    };

    // Create point channel (bounded for backpressure)
    let (point_tx, point_rx) = mpsc::channel(1000);

    // Start trace replay; dropping the sender ends the pipeline run
    let reader = TraceReader::new(&args.trace).realtime(args.realtime);
    let reader_metrics = metrics.clone();
    let reader_task = tokio::spawn(async move {
        if let Err(e) = reader.replay(point_tx, reader_metrics).await {
            error!(error = %format!("{:#}", e), "trace_replay_failed");
        }
    });

    // Stop replay on Ctrl+C; the pipeline drains and shuts down normally
    let reader_abort = reader_task.abort_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        reader_abort.abort();
    });

    // Start metrics reporter
    let reporter_pipeline = pipeline.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            reporter_pipeline.report_metrics().log();
        }
    });

    // Run pipeline - consumes points until the replay finishes
    pipeline.run(point_rx).await;
    reporter.abort();

    if let Err(e) = reader_task.await {
        if !e.is_cancelled() {
            warn!(error = %e, "trace_task_join_failed");
        }
    }

    pipeline.report_metrics().log();

    let snapshot = pipeline.snapshot();
    for zone_id in &snapshot.hotspots {
        info!(zone = %zone_id, "session_hotspot");
    }
    if let Some(ref path) = args.snapshot {
        write_snapshot(path, &snapshot)?;
    }

    info!(
        session_id = %snapshot.session_id,
        hotspots = %snapshot.hotspots.len(),
        "gaze-confusion finished"
    );
    Ok(())
}
