//! Per-zone running statistics
//!
//! Fed from two channels:
//! - zone transition events drive dwell time and revisit counting
//! - raw samples drive saccade distance for the zone currently dwelled in
//!
//! Saccade distance is attributed to the zone in which a movement ends, so the
//! detector must see each sample before the aggregator does.
//!
//! Timestamp regressions are clamped: a negative dwell delta contributes zero,
//! is logged and is counted in `timestamp_anomalies`. Samples with non-finite
//! coordinates are skipped for distance accounting and counted in
//! `skipped_points`.

use crate::domain::events::ZoneTransitionEvent;
use crate::domain::types::{Point, Timestamp, ZoneId};
use crate::domain::zone_metrics::{MetricsSnapshot, ZoneMetrics};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

#[derive(Default)]
struct AggregatorState {
    zones: FxHashMap<ZoneId, ZoneMetrics>,
    /// Zone with an open dwell interval
    current_zone: Option<ZoneId>,
    /// Previous sample, kept even while outside every zone
    last_point: Option<Point>,
    timestamp_anomalies: u64,
    skipped_points: u64,
}

impl AggregatorState {
    fn enter(&mut self, zone_id: &ZoneId, t: Timestamp) {
        // Keep at most one open dwell even if fed an enter without a prior exit
        if let Some(open) = self.current_zone.clone() {
            if &open != zone_id {
                warn!(open_zone = %open, entered = %zone_id, "enter_without_exit");
                self.close(&open, t);
            }
        }

        let metrics = self.zones.entry(zone_id.clone()).or_default();
        if metrics.has_been_visited {
            metrics.revisit_count += 1;
        }
        metrics.has_been_visited = true;
        metrics.open_enter_at = Some(t);
        self.current_zone = Some(zone_id.clone());

        debug!(
            zone = %zone_id,
            t = %t,
            revisit_count = %metrics.revisit_count,
            total_dwell_ms = %metrics.total_dwell_ms,
            "zone_metrics_enter"
        );
    }

    /// Close the open dwell interval of `zone_id`, if any
    fn close(&mut self, zone_id: &ZoneId, t: Timestamp) {
        let metrics = self.zones.entry(zone_id.clone()).or_default();
        if let Some(entered_at) = metrics.open_enter_at.take() {
            let dwell_ms = match t.checked_since(entered_at) {
                Some(ms) => ms,
                None => {
                    self.timestamp_anomalies += 1;
                    warn!(
                        zone = %zone_id,
                        entered_at = %entered_at,
                        exited_at = %t,
                        "dwell_timestamp_regression_clamped"
                    );
                    0
                }
            };
            metrics.total_dwell_ms += dwell_ms;
            metrics.last_exit_at = Some(t);

            debug!(
                zone = %zone_id,
                t = %t,
                dwell_ms = %dwell_ms,
                total_dwell_ms = %metrics.total_dwell_ms,
                "zone_metrics_exit"
            );
        }
        if self.current_zone.as_ref() == Some(zone_id) {
            self.current_zone = None;
        }
    }
}

pub struct MetricsAggregator {
    state: Mutex<AggregatorState>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self { state: Mutex::new(AggregatorState::default()) }
    }

    /// Apply one transition event
    ///
    /// A switch closes `from` and opens `to` under a single lock, with the
    /// same timestamp for both halves.
    pub fn on_zone_event(&self, event: &ZoneTransitionEvent) {
        let mut state = self.state.lock();
        match event {
            ZoneTransitionEvent::Enter { zone_id, t } => {
                state.enter(zone_id, *t);
            }
            ZoneTransitionEvent::Exit { zone_id, t } => {
                // Exits for a zone we are not dwelling in carry no information
                if state.current_zone.as_ref() == Some(zone_id) {
                    state.close(zone_id, *t);
                } else {
                    debug!(zone = %zone_id, "exit_for_untracked_zone");
                }
            }
            ZoneTransitionEvent::Switch { from, to, t } => {
                state.close(from, *t);
                state.enter(to, *t);
            }
        }
    }

    /// Accumulate movement into the zone currently dwelled in
    pub fn on_point(&self, point: &Point) {
        let mut state = self.state.lock();
        let state = &mut *state;

        // Never becomes `last_point`, so distance resumes from the previous sample
        if !point.is_finite() {
            state.skipped_points += 1;
            warn!(x = %point.x, y = %point.y, t = %point.t, "non_finite_point_skipped");
            return;
        }

        if let (Some(last), Some(zone_id)) = (&state.last_point, &state.current_zone) {
            let distance = last.distance_to(point);
            if let Some(metrics) = state.zones.get_mut(zone_id) {
                metrics.saccade_distance += distance;
            }
        }
        state.last_point = Some(*point);
    }

    /// Metrics for one zone; a zero record if the zone was never seen
    pub fn zone_metrics(&self, zone_id: &str) -> ZoneMetrics {
        self.state.lock().zones.get(zone_id).cloned().unwrap_or_default()
    }

    /// Copy of every known zone's metrics, ordered by zone id
    pub fn all_metrics(&self) -> MetricsSnapshot {
        self.state.lock().zones.iter().map(|(id, m)| (id.clone(), m.clone())).collect()
    }

    /// Zone with an open dwell interval
    pub fn current_zone(&self) -> Option<ZoneId> {
        self.state.lock().current_zone.clone()
    }

    /// Dwell deltas clamped because time went backwards
    pub fn timestamp_anomalies(&self) -> u64 {
        self.state.lock().timestamp_anomalies
    }

    /// Samples ignored for distance because a coordinate was not finite
    pub fn skipped_points(&self) -> u64 {
        self.state.lock().skipped_points
    }

    pub fn zone_count(&self) -> usize {
        self.state.lock().zones.len()
    }

    pub fn reset(&self) {
        *self.state.lock() = AggregatorState::default();
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
