use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, warn};

use crate::error::ClientError;
use crate::realtime::Event;

/// What observers are told: delivered events and connection status.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connected,
    Event(Event),
    /// Connection dropped; attempt `attempt` is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Connected again after a drop. Events may have been missed, so local
    /// state should be refreshed from the store.
    Reconnected,
    /// Retry budget spent. Real-time updates are off until a new connect.
    Unavailable,
    Disconnected,
}

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Default)]
struct Observers {
    handlers: RwLock<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

/// Dispatches inbound messages to locally registered observers.
#[derive(Clone, Default)]
pub struct EventRouter {
    inner: Arc<Observers>,
}

/// Disposer returned by [`EventRouter::add_observer`]. Dropping it also
/// removes the observer.
#[must_use = "dropping a Subscription removes the observer"]
pub struct Subscription {
    id: u64,
    observers: Weak<Observers>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            observers.handlers.write().retain(|(id, _)| *id != self.id);
        }
    }
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.write().push((id, Arc::new(handler)));
        Subscription {
            id,
            observers: Arc::downgrade(&self.inner),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Parse one inbound text frame and dispatch it. Anything that is not a
    /// known event is logged and dropped.
    pub fn dispatch_raw(&self, text: &str) -> Result<(), ClientError> {
        match serde_json::from_str::<Event>(text) {
            Ok(event) => {
                self.notify(&Notification::Event(event));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed message");
                Err(ClientError::MalformedMessage(e))
            }
        }
    }

    /// Call every observer registered at the time of the call. A panicking
    /// observer is logged and skipped.
    pub fn notify(&self, notification: &Notification) {
        let snapshot: Vec<Handler> = self
            .inner
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(notification))).is_err() {
                error!(?notification, "observer panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(router: &EventRouter) -> (Subscription, Arc<Mutex<Vec<Notification>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = router.add_observer(move |n| sink.lock().push(n.clone()));
        (sub, seen)
    }

    const VOTE: &str = r#"{"type":"vote_cast","poll_id":7,"vote":{"id":1,"poll_id":7,"option_id":2,"user_id":"u","created_at":"2026-01-01T00:00:00Z"}}"#;

    #[test]
    fn dispatches_to_every_observer() {
        let router = EventRouter::new();
        let (_a, seen_a) = recorder(&router);
        let (_b, seen_b) = recorder(&router);

        router.dispatch_raw(VOTE).unwrap();

        for seen in [seen_a, seen_b] {
            let seen = seen.lock();
            assert_eq!(seen.len(), 1);
            assert!(matches!(&seen[0], Notification::Event(e) if e.poll_id() == 7));
        }
    }

    #[test]
    fn malformed_message_is_dropped_and_next_one_delivered() {
        let router = EventRouter::new();
        let (_sub, seen) = recorder(&router);

        let err = router.dispatch_raw(r#"{"poll_id": 7}"#);
        assert!(matches!(err, Err(ClientError::MalformedMessage(_))));
        assert!(router.dispatch_raw("not json").is_err());
        assert!(seen.lock().is_empty());

        router.dispatch_raw(VOTE).unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn panicking_observer_does_not_block_the_rest() {
        let router = EventRouter::new();
        let _boom = router.add_observer(|_| panic!("observer failure"));
        let (_sub, seen) = recorder(&router);

        router.dispatch_raw(VOTE).unwrap();
        router.dispatch_raw(VOTE).unwrap();
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn unsubscribe_and_drop_both_remove_the_observer() {
        let router = EventRouter::new();
        let (a, seen_a) = recorder(&router);
        let (b, _seen_b) = recorder(&router);
        assert_eq!(router.observer_count(), 2);

        a.unsubscribe();
        assert_eq!(router.observer_count(), 1);
        router.notify(&Notification::Connected);
        assert!(seen_a.lock().is_empty());

        drop(b);
        assert_eq!(router.observer_count(), 0);
    }

    #[test]
    fn observer_can_unsubscribe_another_mid_dispatch() {
        let router = EventRouter::new();
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&victim);
        let _killer = router.add_observer(move |_| {
            slot.lock().take();
        });
        let (sub, seen) = recorder(&router);
        *victim.lock() = Some(sub);

        // Snapshot taken before dispatch still includes the victim.
        router.notify(&Notification::Connected);
        assert_eq!(seen.lock().len(), 1);
        router.notify(&Notification::Connected);
        assert_eq!(seen.lock().len(), 1);
    }
}
