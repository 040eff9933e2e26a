//! Point trace replay
//!
//! Traces are JSONL files with one sample per line:
//! `{"x": 120.0, "y": 530.5, "t": 1500}`. `t` may be an integer, a fractional
//! millisecond value, or absent (stamped with `Timestamp::now()` when read).
//! Blank lines and lines starting with `#` are skipped.

use crate::domain::types::{Point, Timestamp};
use crate::infra::metrics::Metrics;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TraceRecord {
    x: f64,
    y: f64,
    #[serde(default)]
    t: Option<Timestamp>,
}

/// Parse one trace line
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn parse_trace_line(line: &str) -> anyhow::Result<Option<Point>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let record: TraceRecord = serde_json::from_str(line).context("invalid trace record")?;
    let point = Point::new(record.x, record.y, record.t.unwrap_or_else(Timestamp::now));
    if !point.is_finite() {
        anyhow::bail!("non-finite coordinates");
    }
    Ok(Some(point))
}

/// Outcome of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub sent: u64,
    pub rejected: u64,
}

/// Reads a trace file and forwards samples into the pipeline channel
pub struct TraceReader {
    path: String,
    /// Sleep between samples according to their timestamps
    realtime: bool,
}

impl TraceReader {
    pub fn new(path: &str) -> Self {
        Self { path: path.to_string(), realtime: false }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stream every valid sample into `tx`, in file order
    ///
    /// Uses `send().await` so a slow pipeline applies backpressure instead of
    /// dropping samples. Returns early if the receiver is closed.
    pub async fn replay(
        &self,
        tx: mpsc::Sender<Point>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<ReplayStats> {
        let file = File::open(Path::new(&self.path))
            .await
            .with_context(|| format!("opening trace {}", self.path))?;
        let mut lines = BufReader::new(file).lines();

        info!(path = %self.path, realtime = %self.realtime, "trace_replay_started");

        let mut stats = ReplayStats::default();
        let mut line_no = 0u64;
        let mut last_t: Option<Timestamp> = None;

        while let Some(line) =
            lines.next_line().await.with_context(|| format!("reading trace {}", self.path))?
        {
            line_no += 1;
            let point = match parse_trace_line(&line) {
                Ok(Some(point)) => point,
                Ok(None) => continue,
                Err(e) => {
                    stats.rejected += 1;
                    metrics.record_point_rejected();
                    warn!(line = %line_no, error = %format!("{:#}", e), "trace_line_rejected");
                    continue;
                }
            };

            if self.realtime {
                if let Some(delay) = last_t.and_then(|prev| point.t.checked_since(prev)) {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                last_t = Some(point.t);
            }

            if tx.send(point).await.is_err() {
                warn!(line = %line_no, "trace_receiver_closed");
                break;
            }
            stats.sent += 1;
            debug!(line = %line_no, x = %point.x, y = %point.y, t = %point.t, "trace_point_sent");
        }

        info!(sent = %stats.sent, rejected = %stats.rejected, "trace_replay_finished");
        Ok(stats)
    }
}
