//! Ordered observer registry with per-listener failure isolation
//!
//! `emit` snapshots the registered handlers, releases the lock and then
//! delivers in registration order. Handlers may therefore subscribe or
//! unsubscribe from inside a delivery: removals take effect from the next
//! emit, never for handlers already scheduled in the current one.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

type Handler<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// Type-erased removal so `Subscription` does not carry the event type
trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

impl<T: 'static> Detach for Mutex<Registry<T>> {
    fn detach(&self, id: u64) -> bool {
        let mut registry = self.lock();
        let before = registry.handlers.len();
        registry.handlers.retain(|(handler_id, _)| *handler_id != id);
        registry.handlers.len() != before
    }
}

/// Disposer returned by `subscribe`
///
/// Dropping the handle leaves the handler registered; call `unsubscribe`
/// to remove it.
#[must_use = "dropping a Subscription keeps the handler registered forever"]
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    /// Remove the handler. Returns false if it was already gone or the
    /// emitter no longer exists.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.detach(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Ordered list of handlers for one event channel
pub struct Subscribers<T> {
    /// Channel name used when reporting listener failures
    channel: &'static str,
    registry: Arc<Mutex<Registry<T>>>,
    failures: AtomicU64,
}

impl<T: 'static> Subscribers<T> {
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            registry: Arc::new(Mutex::new(Registry { next_id: 0, handlers: Vec::new() })),
            failures: AtomicU64::new(0),
        }
    }

    /// Register a handler at the end of the delivery order
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, Arc::new(handler)));
            id
        };

        let registry: Arc<dyn Detach> = self.registry.clone();
        Subscription { id, registry: Arc::downgrade(&registry) }
    }

    /// Deliver `event` to every handler registered at call time
    ///
    /// Returns the number of handlers that completed without error.
    pub fn emit(&self, event: &T) -> usize {
        let handlers: SmallVec<[Handler<T>; 4]> =
            self.registry.lock().handlers.iter().map(|(_, h)| h.clone()).collect();

        let mut delivered = 0;
        for handler in handlers {
            match handler(event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(channel = %self.channel, error = %e, "listener_failed");
                }
            }
        }
        delivered
    }

    /// Number of currently registered handlers
    pub fn len(&self) -> usize {
        self.registry.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total handler failures since creation (monotonic)
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type BoxedHandler = Box<dyn Fn(&u32) -> anyhow::Result<()> + Send + Sync>;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> BoxedHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &'static str| {
            let log = log_clone.clone();
            Box::new(move |v: &u32| {
                log.lock().push(format!("{}:{}", name, v));
                Ok(())
            }) as BoxedHandler
        };
        (log, make)
    }

    #[test]
    fn test_emit_in_registration_order() {
        let subs = Subscribers::<u32>::new("test");
        let (log, make) = recorder();

        let _a = subs.subscribe(make("a"));
        let _b = subs.subscribe(make("b"));
        let _c = subs.subscribe(make("c"));

        assert_eq!(subs.emit(&7), 3);
        assert_eq!(*log.lock(), vec!["a:7", "b:7", "c:7"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let subs = Subscribers::<u32>::new("test");
        let (log, make) = recorder();

        let a = subs.subscribe(make("a"));
        let _b = subs.subscribe(make("b"));

        assert!(a.unsubscribe());
        subs.emit(&1);

        assert_eq!(*log.lock(), vec!["b:1"]);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let subs = Subscribers::<u32>::new("test");
        let (log, make) = recorder();

        let _a = subs.subscribe(|_| anyhow::bail!("boom"));
        let _b = subs.subscribe(make("b"));

        assert_eq!(subs.emit(&3), 1);
        assert_eq!(*log.lock(), vec!["b:3"]);
        assert_eq!(subs.failure_count(), 1);

        // Emitter keeps working after a failure
        assert_eq!(subs.emit(&4), 1);
        assert_eq!(subs.failure_count(), 2);
    }

    #[test]
    fn test_unsubscribe_during_emit_keeps_current_delivery() {
        let subs = Arc::new(Subscribers::<u32>::new("test"));
        let (log, make) = recorder();

        let pending: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let pending_clone = pending.clone();
        let _a = subs.subscribe(move |_| {
            if let Some(sub) = pending_clone.lock().take() {
                sub.unsubscribe();
            }
            Ok(())
        });
        let b = subs.subscribe(make("b"));
        *pending.lock() = Some(b);

        // b was scheduled before a removed it
        subs.emit(&1);
        // b is gone from now on
        subs.emit(&2);

        assert_eq!(*log.lock(), vec!["b:1"]);
    }

    #[test]
    fn test_subscribe_during_emit_applies_next_time() {
        let subs = Arc::new(Subscribers::<u32>::new("test"));
        let (log, make) = recorder();

        let subs_clone = subs.clone();
        let added = Arc::new(Mutex::new(false));
        let added_clone = added.clone();
        let late = Arc::new(Mutex::new(Some(make("late"))));
        let _a = subs.subscribe(move |_| {
            let mut added = added_clone.lock();
            if !*added {
                if let Some(handler) = late.lock().take() {
                    let _ = subs_clone.subscribe(handler);
                }
                *added = true;
            }
            Ok(())
        });

        subs.emit(&1);
        subs.emit(&2);

        assert_eq!(*log.lock(), vec!["late:2"]);
    }

    #[test]
    fn test_unsubscribe_after_emitter_dropped() {
        let subs = Subscribers::<u32>::new("test");
        let sub = subs.subscribe(|_| Ok(()));
        let other = subs.subscribe(|_| Ok(()));
        assert!(sub.unsubscribe());
        drop(subs);
        assert!(!other.unsubscribe());
    }
}
