//! Domain models - core value types and event payloads
//!
//! This module contains the canonical data types used throughout the system:
//! - `Point` - a single gaze/pointer sample
//! - `Bounds` - zone rectangle supplied by the layout collaborator
//! - `ZoneTransitionEvent` - enter/exit/switch emitted by the detector
//! - `ConfusionEvent` - hotspot signal emitted by the evaluator
//! - `ZoneMetrics` - per-zone running statistics

pub mod events;
pub mod types;
pub mod zone_metrics;

// Re-export commonly used types at module level
pub use events::{ConfusionEvent, Hotspot, ZoneTransitionEvent};
pub use types::{Bounds, Point, Timestamp, ZoneId};
pub use zone_metrics::{MetricsSnapshot, SessionSnapshot, ZoneMetrics};
