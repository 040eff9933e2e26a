//! Confusion detection pipeline
//!
//! The Pipeline owns one instance of every component and wires them together:
//! - point stream → zone detector (membership changes)
//! - point stream → metrics aggregator (saccade distance)
//! - zone detector → metrics aggregator
//! - any transition → confusion evaluator, once the sample is fully delivered
//!
//! Subscription order is significant. The detector sees each sample before
//! the aggregator so a movement that ends inside a zone is attributed to it.
//! The evaluator runs only after every zone listener, external ones included,
//! has seen the transition, so a hotspot never overtakes its cause.


use crate::domain::events::{ConfusionEvent, ZoneTransitionEvent};
use crate::domain::types::{Point, Timestamp, ZoneId};
use crate::domain::zone_metrics::SessionSnapshot;
use crate::infra::config::{Config, EvaluationCadence};
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::services::confusion_evaluator::ConfusionEvaluator;
use crate::services::fanout::Subscription;
use crate::services::metrics_aggregator::MetricsAggregator;
use crate::services::point_stream::PointStream;
use crate::services::zone_detector::ZoneDetector;
use crate::services::zone_registry::{BoundsProvider, ZoneError, ZoneRegistry};
use anyhow::Context;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

/// Per-session bookkeeping not owned by any component
struct SessionState {
    id: String,
    points_total: u64,
    first_point_at: Option<Timestamp>,
    last_point_at: Option<Timestamp>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            points_total: 0,
            first_point_at: None,
            last_point_at: None,
        }
    }

    fn observe(&mut self, t: Timestamp) {
        self.points_total += 1;
        self.first_point_at.get_or_insert(t);
        self.last_point_at = Some(t);
    }
}

/// Wired set of stream, registry, detector, aggregator and evaluator
pub struct Pipeline {
    label: String,
    cadence: EvaluationCadence,
    stream: Arc<PointStream>,
    registry: Arc<ZoneRegistry>,
    detector: Arc<ZoneDetector>,
    aggregator: Arc<MetricsAggregator>,
    evaluator: Arc<ConfusionEvaluator>,
    metrics: Arc<Metrics>,
    session: Mutex<SessionState>,
    /// Timestamp of the transition produced by the sample being published
    transition_at: Arc<Mutex<Option<Timestamp>>>,
    /// Internal subscriptions; kept so the wiring lives as long as the pipeline
    _wiring: Vec<Subscription>,
}

impl Pipeline {
    /// Build and wire a pipeline, registering the configured zone layout
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let registry = Arc::new(ZoneRegistry::new());
        for (zone_id, bounds) in config.zones() {
            registry
                .register(zone_id.clone(), *bounds)
                .with_context(|| format!("registering zone {}", zone_id))?;
        }

        let stream = Arc::new(PointStream::new());
        let detector = Arc::new(ZoneDetector::new(registry.clone()));
        let aggregator = Arc::new(MetricsAggregator::new());
        let evaluator = Arc::new(ConfusionEvaluator::new(aggregator.clone(), config.thresholds()));
        let cadence = config.evaluation_cadence();
        let transition_at = Arc::new(Mutex::new(None));

        let mut wiring = Vec::with_capacity(5);

        // Detector first: membership must be current before movement is attributed
        wiring.push(stream.subscribe({
            let detector = detector.clone();
            let transition_at = transition_at.clone();
            move |p: &Point| {
                if let Some(event) = detector.update(p.x, p.y, Some(p.t)) {
                    *transition_at.lock() = Some(event.timestamp());
                }
                Ok(())
            }
        }));
        wiring.push(stream.subscribe({
            let aggregator = aggregator.clone();
            move |p: &Point| {
                aggregator.on_point(p);
                Ok(())
            }
        }));

        wiring.push(detector.on_zone_event({
            let aggregator = aggregator.clone();
            move |e: &ZoneTransitionEvent| {
                aggregator.on_zone_event(e);
                Ok(())
            }
        }));
        wiring.push(detector.on_zone_event({
            let metrics = metrics.clone();
            move |e: &ZoneTransitionEvent| {
                metrics.record_zone_event(e);
                Ok(())
            }
        }));

        wiring.push(evaluator.on_confusion_event({
            let metrics = metrics.clone();
            move |_: &ConfusionEvent| {
                metrics.record_hotspot();
                Ok(())
            }
        }));

        let session = SessionState::new();
        info!(
            session_id = %session.id,
            label = %config.session_label(),
            zones = %registry.len(),
            dwell_threshold_ms = %config.thresholds().dwell_ms,
            revisit_threshold = %config.thresholds().revisit_count,
            cadence = ?cadence,
            "pipeline_initialized"
        );

        Ok(Self {
            label: config.session_label().to_string(),
            cadence,
            stream,
            registry,
            detector,
            aggregator,
            evaluator,
            metrics,
            session: Mutex::new(session),
            transition_at,
            _wiring: wiring,
        })
    }

    /// Push one sample through the pipeline
    ///
    /// Returns after every subscriber, internal and external, has run. With
    /// the on-transition cadence the evaluator runs last, stamped with the
    /// transition's timestamp.
    pub fn publish(&self, point: &Point) {
        let process_start = Instant::now();

        self.session.lock().observe(point.t);
        self.stream.publish(point);

        let transition_at = self.transition_at.lock().take();
        if let (EvaluationCadence::OnTransition, Some(t)) = (self.cadence, transition_at) {
            self.evaluator.evaluate_at(t);
        }

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_point_processed(latency_us);
    }

    /// Consume samples until the channel closes
    ///
    /// With an interval cadence the evaluator also runs on a timer. A final
    /// evaluation always runs once the channel is drained.
    pub async fn run(&self, mut point_rx: mpsc::Receiver<Point>) {
        let mut eval_interval = match self.cadence {
            EvaluationCadence::Interval(period) => {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(ticker)
            }
            EvaluationCadence::OnTransition => None,
        };

        info!(session_id = %self.session_id(), "pipeline_started");

        loop {
            tokio::select! {
                point = point_rx.recv() => {
                    match point {
                        Some(p) => self.publish(&p),
                        None => break, // Channel closed
                    }
                }
                _ = next_tick(&mut eval_interval) => {
                    let fired = self.evaluate();
                    debug!(hotspots = %fired.len(), "interval_evaluation");
                }
            }
        }

        let fired = self.evaluate();
        let session = self.session.lock();
        info!(
            session_id = %session.id,
            points = %session.points_total,
            final_hotspots = %fired.len(),
            flagged = %self.evaluator.flagged_zones().len(),
            "pipeline_stopped"
        );
    }

    /// Run the evaluator now
    ///
    /// Hotspots are stamped with the last sample's timestamp so they share
    /// the stream's clock, or `Timestamp::now()` before the first sample.
    pub fn evaluate(&self) -> Vec<ConfusionEvent> {
        let t = self.session.lock().last_point_at.unwrap_or_else(Timestamp::now);
        self.evaluator.evaluate_at(t)
    }

    pub fn register_zone<P>(&self, id: impl Into<ZoneId>, provider: P) -> Result<(), ZoneError>
    where
        P: BoundsProvider + 'static,
    {
        self.registry.register(id, provider)
    }

    pub fn unregister_zone(&self, id: &str) -> bool {
        self.registry.unregister(id)
    }

    pub fn on_zone_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ZoneTransitionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.detector.on_zone_event(handler)
    }

    pub fn on_confusion_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConfusionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.evaluator.on_confusion_event(handler)
    }

    /// Export the whole session state
    pub fn snapshot(&self) -> SessionSnapshot {
        let (session_id, points_total, first_point_at, last_point_at) = {
            let s = self.session.lock();
            (s.id.clone(), s.points_total, s.first_point_at, s.last_point_at)
        };
        let duration_ms = match (first_point_at, last_point_at) {
            (Some(first), Some(last)) => last.checked_since(first).unwrap_or(0),
            _ => 0,
        };

        SessionSnapshot {
            session_id,
            label: self.label.clone(),
            points_total,
            first_point_at,
            last_point_at,
            duration_ms,
            current_zone: self.detector.current_zone(),
            zones: self.aggregator.all_metrics(),
            hotspots: self.evaluator.flagged_zones(),
            timestamp_anomalies: self.aggregator.timestamp_anomalies(),
            skipped_points: self.aggregator.skipped_points(),
        }
    }

    /// Start a new session: clears membership, metrics and latches
    ///
    /// Zones and subscriptions are kept. The session gets a fresh id.
    pub fn reset(&self) {
        self.detector.reset();
        self.aggregator.reset();
        self.evaluator.reset();
        let mut session = self.session.lock();
        *session = SessionState::new();
        info!(session_id = %session.id, "pipeline_reset");
    }

    /// Sync gauges and produce a periodic metrics summary
    pub fn report_metrics(&self) -> MetricsSummary {
        self.metrics.set_listener_failures(self.listener_failures());
        self.metrics.set_timestamp_anomalies(self.aggregator.timestamp_anomalies());
        self.metrics.report(self.aggregator.zone_count(), self.evaluator.flagged_zones().len())
    }

    /// Failures across every fan-out point in the pipeline
    pub fn listener_failures(&self) -> u64 {
        self.stream.listener_failures()
            + self.detector.listener_failures()
            + self.evaluator.listener_failures()
    }

    pub fn session_id(&self) -> String {
        self.session.lock().id.clone()
    }

    pub fn registry(&self) -> &Arc<ZoneRegistry> {
        &self.registry
    }

    pub fn detector(&self) -> &Arc<ZoneDetector> {
        &self.detector
    }

    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    pub fn evaluator(&self) -> &Arc<ConfusionEvaluator> {
        &self.evaluator
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

/// Tick the optional timer; never resolves without one
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
