//! Zone membership state machine
//!
//! Turns raw samples into exactly one transition event per membership
//! change:
//! - none → Z emits `Enter(Z)`
//! - Z → none emits `Exit(Z)`
//! - Z → W emits `Switch(Z → W)`
//! - repeated samples inside the same zone (or outside all zones) emit nothing

use crate::domain::events::ZoneTransitionEvent;
use crate::domain::types::{Timestamp, ZoneId};
use crate::services::fanout::{Subscribers, Subscription};
use crate::services::zone_registry::ZoneRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

pub struct ZoneDetector {
    registry: Arc<ZoneRegistry>,
    current_zone: Mutex<Option<ZoneId>>,
    listeners: Subscribers<ZoneTransitionEvent>,
}

impl ZoneDetector {
    pub fn new(registry: Arc<ZoneRegistry>) -> Self {
        Self {
            registry,
            current_zone: Mutex::new(None),
            listeners: Subscribers::new("zone_event"),
        }
    }

    /// Feed one sample; `timestamp` defaults to `Timestamp::now()`
    ///
    /// Returns the emitted event, if the sample changed membership.
    pub fn update(
        &self,
        x: f64,
        y: f64,
        timestamp: Option<Timestamp>,
    ) -> Option<ZoneTransitionEvent> {
        let t = timestamp.unwrap_or_else(Timestamp::now);
        let detected = self.registry.find_zone_at_point(x, y);

        let event = {
            let mut current = self.current_zone.lock();
            let event = match (current.take(), detected.clone()) {
                (None, None) => None,
                (None, Some(zone_id)) => Some(ZoneTransitionEvent::Enter { zone_id, t }),
                (Some(zone_id), None) => Some(ZoneTransitionEvent::Exit { zone_id, t }),
                (Some(from), Some(to)) if from == to => {
                    *current = Some(from);
                    return None;
                }
                (Some(from), Some(to)) => Some(ZoneTransitionEvent::Switch { from, to, t }),
            };
            *current = detected;
            event
        };

        // Lock released: listeners may query the detector
        if let Some(ref event) = event {
            debug!(event = %event.as_str(), t = %t, x = %x, y = %y, "zone_transition");
            self.listeners.emit(event);
        }
        event
    }

    pub fn on_zone_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ZoneTransitionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.subscribe(handler)
    }

    pub fn current_zone(&self) -> Option<ZoneId> {
        self.current_zone.lock().clone()
    }

    /// Forget the current zone without emitting an exit
    pub fn reset(&self) {
        *self.current_zone.lock() = None;
    }

    pub fn registry(&self) -> &Arc<ZoneRegistry> {
        &self.registry
    }

    pub fn listener_failures(&self) -> u64 {
        self.listeners.failure_count()
    }
}
