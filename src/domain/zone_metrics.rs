//! Per-zone running statistics and the exported session snapshot

use crate::domain::types::{Timestamp, ZoneId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Running statistics for one zone
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ZoneMetrics {
    /// Sum of closed dwell intervals
    pub total_dwell_ms: u64,
    /// Entries after the first one
    pub revisit_count: u32,
    pub has_been_visited: bool,
    /// Set only while this zone is the open dwell
    pub open_enter_at: Option<Timestamp>,
    pub last_exit_at: Option<Timestamp>,
    pub saccade_distance: f64,
}

impl ZoneMetrics {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open_enter_at.is_some()
    }
}

/// Immutable copy of all zone metrics, ordered by zone id
pub type MetricsSnapshot = BTreeMap<ZoneId, ZoneMetrics>;

/// Opaque export of one observation session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub label: String,
    pub points_total: u64,
    pub first_point_at: Option<Timestamp>,
    pub last_point_at: Option<Timestamp>,
    pub duration_ms: u64,
    pub current_zone: Option<ZoneId>,
    pub zones: MetricsSnapshot,
    pub hotspots: Vec<ZoneId>,
    pub timestamp_anomalies: u64,
    /// Samples left out of distance accounting (non-finite coordinates)
    pub skipped_points: u64,
}
