//! Event egress - writes zone and confusion events to file
//!
//! Events are written in JSONL format (one JSON object per line) to the file
//! specified in config. Each line carries the session id and the wall-clock
//! time it was recorded next to the event payload.

use crate::domain::events::{ConfusionEvent, ZoneTransitionEvent};
use crate::domain::zone_metrics::SessionSnapshot;
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

#[derive(Serialize)]
struct EgressRecord<'a, E: Serialize> {
    session_id: &'a str,
    recorded_at: String,
    #[serde(flatten)]
    event: &'a E,
}

/// Egress writer for pipeline events
pub struct EventEgress {
    file_path: String,
    session_id: String,
}

impl EventEgress {
    pub fn new(file_path: &str, session_id: &str) -> Self {
        info!(file_path = %file_path, session_id = %session_id, "egress_initialized");
        Self { file_path: file_path.to_string(), session_id: session_id.to_string() }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Write a zone transition. Returns true if successful.
    pub fn write_zone_event(&self, event: &ZoneTransitionEvent) -> bool {
        match self.write_record(event) {
            Ok(()) => true,
            Err(e) => {
                error!(event = %event.as_str(), error = %e, "zone_event_egress_failed");
                false
            }
        }
    }

    /// Write a confusion event. Returns true if successful.
    pub fn write_confusion_event(&self, event: &ConfusionEvent) -> bool {
        match self.write_record(event) {
            Ok(()) => {
                info!(zone = %event.zone_id(), "confusion_event_egressed");
                true
            }
            Err(e) => {
                error!(zone = %event.zone_id(), error = %e, "confusion_event_egress_failed");
                false
            }
        }
    }

    fn write_record<E: Serialize>(&self, event: &E) -> anyhow::Result<()> {
        let record = EgressRecord {
            session_id: &self.session_id,
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        let json = serde_json::to_string(&record).context("serializing egress record")?;
        self.append_line(&json)
            .with_context(|| format!("appending to {}", self.file_path))
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}

/// Write a session snapshot as pretty JSON, replacing any existing file
pub fn write_snapshot<P: AsRef<Path>>(path: P, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(snapshot).context("serializing session snapshot")?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("writing snapshot to {}", path.display()))?;

    info!(
        path = %path.display(),
        session_id = %snapshot.session_id,
        zones = %snapshot.zones.len(),
        hotspots = %snapshot.hotspots.len(),
        "snapshot_written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::Hotspot;
    use crate::domain::types::{Timestamp, ZoneId};
    use crate::domain::zone_metrics::{MetricsSnapshot, ZoneMetrics};
    use std::fs;
    use tempfile::tempdir;

    fn enter(zone: &str, t: u64) -> ZoneTransitionEvent {
        ZoneTransitionEvent::Enter { zone_id: ZoneId::from(zone), t: Timestamp(t) }
    }

    fn hotspot(zone: &str) -> ConfusionEvent {
        ConfusionEvent::Hotspot(Hotspot {
            zone_id: ZoneId::from(zone),
            dwell_ms: 8100,
            revisit_count: 4,
            saccade_distance: 12.5,
            timestamp: Timestamp(9000),
        })
    }

    #[test]
    fn test_egress_new() {
        let egress = EventEgress::new("test.jsonl", "s1");
        assert_eq!(egress.file_path(), "test.jsonl");
    }

    #[test]
    fn test_write_zone_event() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("events.jsonl");
        let egress = EventEgress::new(file_path.to_str().unwrap(), "session-1");

        assert!(egress.write_zone_event(&enter("PAY", 100)));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["session_id"], "session-1");
        assert_eq!(parsed["type"], "ZONE_ENTER");
        assert_eq!(parsed["zone_id"], "PAY");
        assert_eq!(parsed["t"], 100);
        assert!(parsed["recorded_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_write_confusion_event() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("events.jsonl");
        let egress = EventEgress::new(file_path.to_str().unwrap(), "session-1");

        assert!(egress.write_confusion_event(&hotspot("PAY")));

        let content = fs::read_to_string(&file_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["type"], "CONFUSION_HOTSPOT");
        assert_eq!(parsed["zone_id"], "PAY");
        assert_eq!(parsed["dwell_ms"], 8100);
        assert_eq!(parsed["revisit_count"], 4);
        assert_eq!(parsed["timestamp"], 9000);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("nested").join("dir").join("events.jsonl");
        let egress = EventEgress::new(nested_path.to_str().unwrap(), "s1");

        assert!(egress.write_zone_event(&enter("A", 0)));
        assert!(nested_path.exists());
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("events.jsonl");

        // Pre-create file with existing content
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = EventEgress::new(file_path.to_str().unwrap(), "s1");
        egress.write_zone_event(&enter("A", 0));
        egress.write_confusion_event(&hotspot("A"));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("existing"));
        assert!(lines[1].contains("ZONE_ENTER"));
        assert!(lines[2].contains("CONFUSION_HOTSPOT"));
    }

    #[test]
    fn test_unwritable_path_reports_failure() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for append
        let egress = EventEgress::new(dir.path().to_str().unwrap(), "s1");
        assert!(!egress.write_zone_event(&enter("A", 0)));
    }

    #[test]
    fn test_write_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("snapshot.json");

        let mut zones = MetricsSnapshot::new();
        zones.insert(
            ZoneId::from("PAY"),
            ZoneMetrics { total_dwell_ms: 8100, revisit_count: 3, ..Default::default() },
        );
        let snapshot = SessionSnapshot {
            session_id: "s1".to_string(),
            label: "checkout".to_string(),
            points_total: 9,
            first_point_at: Some(Timestamp(0)),
            last_point_at: Some(Timestamp(8500)),
            duration_ms: 8500,
            current_zone: None,
            zones,
            hotspots: vec![],
            timestamp_anomalies: 0,
            skipped_points: 0,
        };

        write_snapshot(&path, &snapshot).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["session_id"], "s1");
        assert_eq!(parsed["zones"]["PAY"]["total_dwell_ms"], 8100);
        assert_eq!(parsed["zones"]["PAY"]["revisit_count"], 3);
    }
}
