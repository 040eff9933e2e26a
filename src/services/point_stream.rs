//! Direct fan-out of gaze samples
//!
//! No buffering and no backpressure: `publish` returns only after every
//! subscriber has seen the point.

use crate::domain::types::Point;
use crate::services::fanout::{Subscribers, Subscription};

pub struct PointStream {
    subscribers: Subscribers<Point>,
}

impl PointStream {
    pub fn new() -> Self {
        Self { subscribers: Subscribers::new("point_stream") }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Point) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    /// Deliver one sample to all current subscribers, in registration order
    pub fn publish(&self, point: &Point) -> usize {
        self.subscribers.emit(point)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn listener_failures(&self) -> u64 {
        self.subscribers.failure_count()
    }
}

impl Default for PointStream {
    fn default() -> Self {
        Self::new()
    }
}
