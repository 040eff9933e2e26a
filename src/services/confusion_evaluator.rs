//! Threshold-based confusion detection
//!
//! A zone is confused when both its dwell time and its revisit count are
//! strictly above the configured thresholds. Hotspots are edge-triggered: each
//! zone fires once, then stays latched until `reset`.

use crate::domain::events::{ConfusionEvent, Hotspot};
use crate::domain::types::{Timestamp, ZoneId};
use crate::domain::zone_metrics::ZoneMetrics;
use crate::services::fanout::{Subscribers, Subscription};
use crate::services::metrics_aggregator::MetricsAggregator;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Default dwell threshold (5 seconds)
pub const DEFAULT_DWELL_THRESHOLD_MS: u64 = 5000;

/// Default revisit threshold
pub const DEFAULT_REVISIT_THRESHOLD: u32 = 3;

/// Thresholds that must both be exceeded for a hotspot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ConfusionThresholds {
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
    #[serde(default = "default_revisit_count")]
    pub revisit_count: u32,
}

fn default_dwell_ms() -> u64 {
    DEFAULT_DWELL_THRESHOLD_MS
}

fn default_revisit_count() -> u32 {
    DEFAULT_REVISIT_THRESHOLD
}

impl Default for ConfusionThresholds {
    fn default() -> Self {
        Self { dwell_ms: DEFAULT_DWELL_THRESHOLD_MS, revisit_count: DEFAULT_REVISIT_THRESHOLD }
    }
}

impl ConfusionThresholds {
    /// Strict comparison on both axes
    #[inline]
    pub fn is_confused(&self, metrics: &ZoneMetrics) -> bool {
        metrics.total_dwell_ms > self.dwell_ms && metrics.revisit_count > self.revisit_count
    }
}

pub struct ConfusionEvaluator {
    aggregator: Arc<MetricsAggregator>,
    thresholds: ConfusionThresholds,
    /// Zones that already fired
    flagged: Mutex<FxHashSet<ZoneId>>,
    listeners: Subscribers<ConfusionEvent>,
}

impl ConfusionEvaluator {
    pub fn new(aggregator: Arc<MetricsAggregator>, thresholds: ConfusionThresholds) -> Self {
        Self {
            aggregator,
            thresholds,
            flagged: Mutex::new(FxHashSet::default()),
            listeners: Subscribers::new("confusion_event"),
        }
    }

    /// Evaluate the current metrics, stamping hotspots with `Timestamp::now()`
    pub fn evaluate(&self) -> Vec<ConfusionEvent> {
        self.evaluate_at(Timestamp::now())
    }

    /// Evaluate the current metrics and emit newly confused zones
    ///
    /// Returns the events emitted by this call, in zone id order.
    pub fn evaluate_at(&self, timestamp: Timestamp) -> Vec<ConfusionEvent> {
        let snapshot = self.aggregator.all_metrics();

        let events: Vec<ConfusionEvent> = {
            let mut flagged = self.flagged.lock();
            snapshot
                .into_iter()
                .filter(|(_, metrics)| self.thresholds.is_confused(metrics))
                // insert() is false for zones that already fired
                .filter(|(zone_id, _)| flagged.insert(zone_id.clone()))
                .map(|(zone_id, metrics)| {
                    ConfusionEvent::Hotspot(Hotspot {
                        zone_id,
                        dwell_ms: metrics.total_dwell_ms,
                        revisit_count: metrics.revisit_count,
                        saccade_distance: metrics.saccade_distance,
                        timestamp,
                    })
                })
                .collect()
        };

        for event in &events {
            let ConfusionEvent::Hotspot(hotspot) = event;
            info!(
                zone = %hotspot.zone_id,
                dwell_ms = %hotspot.dwell_ms,
                revisit_count = %hotspot.revisit_count,
                saccade_distance = %format!("{:.1}", hotspot.saccade_distance),
                t = %hotspot.timestamp,
                "confusion_hotspot"
            );
            self.listeners.emit(event);
        }
        events
    }

    pub fn on_confusion_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConfusionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.subscribe(handler)
    }

    pub fn is_flagged(&self, zone_id: &str) -> bool {
        self.flagged.lock().contains(zone_id)
    }

    /// Latched zones, sorted
    pub fn flagged_zones(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = self.flagged.lock().iter().cloned().collect();
        zones.sort();
        zones
    }

    pub fn thresholds(&self) -> ConfusionThresholds {
        self.thresholds
    }

    /// Clear all latches so confused zones may fire again
    pub fn reset(&self) {
        self.flagged.lock().clear();
    }

    pub fn listener_failures(&self) -> u64 {
        self.listeners.failure_count()
    }
}
