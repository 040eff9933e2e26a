//! Services - confusion detection components and their wiring
//!
//! This module contains the core business logic services:
//! - `fanout` - Ordered observer registry with failure isolation
//! - `point_stream` - Broadcast of raw gaze samples
//! - `zone_registry` - Named zones with late-bound geometry
//! - `zone_detector` - Zone membership state machine
//! - `metrics_aggregator` - Per-zone dwell, revisit and saccade statistics
//! - `confusion_evaluator` - Threshold evaluation with per-zone latching
//! - `pipeline` - Owns and wires all of the above, async run loop

pub mod confusion_evaluator;
pub mod fanout;
pub mod metrics_aggregator;
pub mod pipeline;
pub mod point_stream;
pub mod zone_detector;
pub mod zone_registry;

// Re-export commonly used types
pub use confusion_evaluator::{ConfusionEvaluator, ConfusionThresholds};
pub use fanout::{Subscribers, Subscription};
pub use metrics_aggregator::MetricsAggregator;
pub use pipeline::Pipeline;
pub use point_stream::PointStream;
pub use zone_detector::ZoneDetector;
pub use zone_registry::{BoundsProvider, ZoneError, ZoneRegistry};
