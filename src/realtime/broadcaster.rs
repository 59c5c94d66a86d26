use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::realtime::event::Event;
use crate::realtime::registry::{SessionId, SessionRegistry};

/// Fans published events out to every open session.
///
/// Constructed once at startup and shared by `Arc` with the request
/// handlers and the session endpoints.
pub struct Broadcaster {
    registry: SessionRegistry,
    config: RealtimeConfig,
}

impl Broadcaster {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            config,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Create a bounded delivery channel and register it as a new session.
    pub fn open_session(&self) -> Result<(SessionId, mpsc::Receiver<Arc<str>>), RealtimeError> {
        let (tx, rx) = mpsc::channel(self.config.session_buffer);
        let id = self.registry.register(tx)?;
        Ok((id, rx))
    }

    pub fn close_session(&self, id: SessionId) -> bool {
        self.registry.unregister(id)
    }

    /// Serialize `event` once and queue it for every open session.
    ///
    /// A session whose buffer is full or whose receiver is gone is removed;
    /// that never fails the call. Returns how many sessions the event was
    /// queued for.
    pub fn publish(&self, event: &Event) -> Result<usize, RealtimeError> {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(event_type = event.kind(), error = %e, "failed to serialize event");
                return Err(RealtimeError::Serialization(e));
            }
        };

        let mut delivered = 0usize;
        let mut failed = Vec::new();
        self.registry.for_each(|session| {
            match session.try_deliver(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(session_id = %session.id(), event_type = event.kind(), "session buffer full, dropping session");
                    failed.push(session.id());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session_id = %session.id(), "session channel closed");
                    failed.push(session.id());
                }
            }
        });

        for id in failed.iter().copied() {
            self.registry.unregister(id);
        }

        counter!("realtime_events_published_total").increment(1);
        if !failed.is_empty() {
            counter!("realtime_deliveries_dropped_total").increment(failed.len() as u64);
        }
        debug!(
            event_type = event.kind(),
            poll_id = event.poll_id(),
            delivered,
            dropped = failed.len(),
            "event published"
        );
        Ok(delivered)
    }

    /// Close every session and release the registry.
    pub fn shutdown(&self) {
        let closed = self.registry.close_all();
        info!(sessions = closed, "broadcaster shut down");
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(RealtimeConfig::default())
    }
}
