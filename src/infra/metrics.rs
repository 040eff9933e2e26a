//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::events::ZoneTransitionEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total points processed (monotonic)
    points_total: AtomicU64,
    /// Points since last report (reset on report)
    points_since_report: AtomicU64,
    /// Sum of per-point latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max per-point latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Point processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    zone_enters: AtomicU64,
    zone_exits: AtomicU64,
    zone_switches: AtomicU64,
    hotspots_total: AtomicU64,
    /// Gauge, mirrored from the fan-out failure counters
    listener_failures: AtomicU64,
    /// Gauge, mirrored from the aggregator
    timestamp_anomalies: AtomicU64,
    /// Points dropped by the replay reader (malformed lines)
    points_rejected: AtomicU64,
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            points_total: AtomicU64::new(0),
            points_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: Default::default(),
            zone_enters: AtomicU64::new(0),
            zone_exits: AtomicU64::new(0),
            zone_switches: AtomicU64::new(0),
            hotspots_total: AtomicU64::new(0),
            listener_failures: AtomicU64::new(0),
            timestamp_anomalies: AtomicU64::new(0),
            points_rejected: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Record a processed point with its end-to-end dispatch latency
    #[inline]
    pub fn record_point_processed(&self, latency_us: u64) {
        self.points_total.fetch_add(1, Ordering::Relaxed);
        self.points_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_zone_event(&self, event: &ZoneTransitionEvent) {
        let counter = match event {
            ZoneTransitionEvent::Enter { .. } => &self.zone_enters,
            ZoneTransitionEvent::Exit { .. } => &self.zone_exits,
            ZoneTransitionEvent::Switch { .. } => &self.zone_switches,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_hotspot(&self) {
        self.hotspots_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_point_rejected(&self) {
        self.points_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_listener_failures(&self, failures: u64) {
        self.listener_failures.store(failures, Ordering::Relaxed);
    }

    pub fn set_timestamp_anomalies(&self, anomalies: u64) {
        self.timestamp_anomalies.store(anomalies, Ordering::Relaxed);
    }

    pub fn points_total(&self) -> u64 {
        self.points_total.load(Ordering::Relaxed)
    }

    pub fn hotspots_total(&self) -> u64 {
        self.hotspots_total.load(Ordering::Relaxed)
    }

    pub fn points_rejected(&self) -> u64 {
        self.points_rejected.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self, zones_tracked: usize, zones_flagged: usize) -> MetricsSummary {
        let points_count = self.points_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let points_per_sec = if elapsed.as_secs_f64() > 0.0 {
            points_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if points_count > 0 { latency_sum / points_count } else { 0 };

        MetricsSummary {
            points_total: self.points_total.load(Ordering::Relaxed),
            points_per_sec,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
            zone_enters: self.zone_enters.load(Ordering::Relaxed),
            zone_exits: self.zone_exits.load(Ordering::Relaxed),
            zone_switches: self.zone_switches.load(Ordering::Relaxed),
            hotspots_total: self.hotspots_total.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            timestamp_anomalies: self.timestamp_anomalies.load(Ordering::Relaxed),
            points_rejected: self.points_rejected.load(Ordering::Relaxed),
            zones_tracked,
            zones_flagged,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub points_total: u64,
    pub points_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Point processing latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub zone_enters: u64,
    pub zone_exits: u64,
    pub zone_switches: u64,
    pub hotspots_total: u64,
    pub listener_failures: u64,
    pub timestamp_anomalies: u64,
    pub points_rejected: u64,
    /// Zones with accumulated metrics
    pub zones_tracked: usize,
    /// Zones currently latched as hotspots
    pub zones_flagged: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            points_total = %self.points_total,
            points_per_sec = format!("{:.1}", self.points_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            enters = %self.zone_enters,
            exits = %self.zone_exits,
            switches = %self.zone_switches,
            hotspots = %self.hotspots_total,
            zones = %self.zones_tracked,
            flagged = %self.zones_flagged,
            listener_failures = %self.listener_failures,
            ts_anomalies = %self.timestamp_anomalies,
            rejected = %self.points_rejected,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Timestamp, ZoneId};

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.points_total(), 0);
        assert_eq!(metrics.hotspots_total(), 0);
    }

    #[test]
    fn test_record_point() {
        let metrics = Metrics::new();

        metrics.record_point_processed(100);
        assert_eq!(metrics.points_total(), 1);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 100);

        metrics.record_point_processed(200);
        assert_eq!(metrics.points_total(), 2);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_record_zone_events_by_kind() {
        let metrics = Metrics::new();
        let a = ZoneId::from("A");
        let b = ZoneId::from("B");

        let first = ZoneTransitionEvent::Enter { zone_id: a.clone(), t: Timestamp(0) };
        metrics.record_zone_event(&first);
        metrics.record_zone_event(&ZoneTransitionEvent::Switch {
            from: a.clone(),
            to: b.clone(),
            t: Timestamp(10),
        });
        metrics.record_zone_event(&ZoneTransitionEvent::Exit { zone_id: b, t: Timestamp(20) });
        metrics.record_zone_event(&ZoneTransitionEvent::Enter { zone_id: a, t: Timestamp(30) });

        let summary = metrics.report(0, 0);
        assert_eq!(summary.zone_enters, 2);
        assert_eq!(summary.zone_switches, 1);
        assert_eq!(summary.zone_exits, 1);
    }

    #[test]
    fn test_report() {
        let metrics = Metrics::new();

        metrics.record_point_processed(100);
        metrics.record_point_processed(200);
        metrics.record_point_processed(300);
        metrics.record_hotspot();
        metrics.set_listener_failures(2);
        metrics.set_timestamp_anomalies(1);

        let summary = metrics.report(5, 1);

        assert_eq!(summary.points_total, 3);
        assert_eq!(summary.avg_process_latency_us, 200); // (100+200+300)/3
        assert_eq!(summary.max_process_latency_us, 300);
        assert_eq!(summary.zones_tracked, 5);
        assert_eq!(summary.zones_flagged, 1);
        assert_eq!(summary.hotspots_total, 1);
        assert_eq!(summary.listener_failures, 2);
        assert_eq!(summary.timestamp_anomalies, 1);

        // Periodic counters should be reset
        assert_eq!(metrics.points_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.latency_max_us.load(Ordering::Relaxed), 0);

        // Monotonic counters are not
        assert_eq!(metrics.report(0, 0).points_total, 3);
    }

    #[test]
    fn test_report_empty() {
        let metrics = Metrics::new();
        let summary = metrics.report(0, 0);

        assert_eq!(summary.points_total, 0);
        assert_eq!(summary.avg_process_latency_us, 0);
        assert_eq!(summary.max_process_latency_us, 0);
        assert_eq!(summary.lat_p99_us, 0);
    }

    #[test]
    fn test_max_latency_tracking() {
        let metrics = Metrics::new();

        metrics.record_point_processed(100);
        metrics.record_point_processed(500);
        metrics.record_point_processed(200);
        metrics.record_point_processed(50);

        assert_eq!(metrics.latency_max_us.load(Ordering::Relaxed), 500);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    m.record_point_processed(i as u64);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.points_total(), 10_000);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(200), 1);
        assert_eq!(bucket_index(201), 2);
        assert_eq!(bucket_index(400), 2);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10); // overflow
        assert_eq!(bucket_index(100000), 10);
    }

    #[test]
    fn test_histogram_buckets() {
        let metrics = Metrics::new();

        metrics.record_point_processed(50); // bucket 0 (≤100)
        metrics.record_point_processed(150); // bucket 1 (≤200)
        metrics.record_point_processed(350); // bucket 2 (≤400)
        metrics.record_point_processed(60000); // bucket 10 (overflow)

        let summary = metrics.report(0, 0);

        assert_eq!(summary.lat_buckets[0], 1);
        assert_eq!(summary.lat_buckets[1], 1);
        assert_eq!(summary.lat_buckets[2], 1);
        assert_eq!(summary.lat_buckets[10], 1);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();

        for _ in 0..100 {
            metrics.record_point_processed(150);
        }

        let summary = metrics.report(0, 0);

        // Upper bound of bucket 1 (≤200)
        assert_eq!(summary.lat_p50_us, 200);
        assert_eq!(summary.lat_p99_us, 200);
    }

    #[test]
    fn test_rejected_points() {
        let metrics = Metrics::new();
        metrics.record_point_rejected();
        metrics.record_point_rejected();
        assert_eq!(metrics.points_rejected(), 2);
        assert_eq!(metrics.report(0, 0).points_rejected, 2);
    }
}
