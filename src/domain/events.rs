//! Event payloads emitted by the detector and the confusion evaluator
//!
//! Both event categories are closed enums so consumers match exhaustively.
//! Payloads are plain values; subscribers receive them by reference and must
//! clone anything they want to keep.

use crate::domain::types::{Timestamp, ZoneId};
use serde::Serialize;

/// A single zone membership change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ZoneTransitionEvent {
    #[serde(rename = "ZONE_ENTER")]
    Enter { zone_id: ZoneId, t: Timestamp },
    #[serde(rename = "ZONE_EXIT")]
    Exit { zone_id: ZoneId, t: Timestamp },
    #[serde(rename = "ZONE_SWITCH")]
    Switch { from: ZoneId, to: ZoneId, t: Timestamp },
}

impl ZoneTransitionEvent {
    /// Timestamp of the sample that caused the transition
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        match self {
            ZoneTransitionEvent::Enter { t, .. }
            | ZoneTransitionEvent::Exit { t, .. }
            | ZoneTransitionEvent::Switch { t, .. } => *t,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneTransitionEvent::Enter { .. } => "zone_enter",
            ZoneTransitionEvent::Exit { .. } => "zone_exit",
            ZoneTransitionEvent::Switch { .. } => "zone_switch",
        }
    }

    /// Zone the point is in after this transition, if any
    pub fn entered_zone(&self) -> Option<&ZoneId> {
        match self {
            ZoneTransitionEvent::Enter { zone_id, .. } => Some(zone_id),
            ZoneTransitionEvent::Exit { .. } => None,
            ZoneTransitionEvent::Switch { to, .. } => Some(to),
        }
    }
}

/// Snapshot of the metrics that tripped a hotspot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotspot {
    pub zone_id: ZoneId,
    pub dwell_ms: u64,
    pub revisit_count: u32,
    pub saccade_distance: f64,
    pub timestamp: Timestamp,
}

/// Confusion signal raised by the evaluator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ConfusionEvent {
    #[serde(rename = "CONFUSION_HOTSPOT")]
    Hotspot(Hotspot),
}

impl ConfusionEvent {
    #[inline]
    pub fn zone_id(&self) -> &ZoneId {
        match self {
            ConfusionEvent::Hotspot(h) => &h.zone_id,
        }
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        match self {
            ConfusionEvent::Hotspot(h) => h.timestamp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfusionEvent::Hotspot(_) => "confusion_hotspot",
        }
    }
}
