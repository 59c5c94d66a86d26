//! Set of live delivery sessions.
//!
//! Iteration runs over a snapshot taken under a short read lock, so sessions
//! may be registered or removed while a broadcast is walking the set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use metrics::gauge;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::error::RealtimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// One connected client and the sending half of its delivery channel.
pub struct Session {
    id: SessionId,
    tx: mpsc::Sender<Arc<str>>,
    state: Mutex<SessionState>,
    connected_at: Instant,
}

impl Session {
    fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: SessionId::new(),
            tx,
            state: Mutex::new(SessionState::Connecting),
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Open and the receiving half still alive.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open && !self.tx.is_closed()
    }

    /// Queue a message without waiting. Fails when the buffer is full or the
    /// receiver is gone.
    pub fn try_deliver(&self, message: Arc<str>) -> Result<(), TrySendError<Arc<str>>> {
        self.tx.try_send(message)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    /// Mirrors `sessions.len()` so size queries skip the lock.
    active_count: AtomicUsize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a session for `tx` in the `Open` state.
    pub fn register(&self, tx: mpsc::Sender<Arc<str>>) -> Result<SessionId, RealtimeError> {
        if tx.is_closed() {
            return Err(RealtimeError::ChannelClosed);
        }

        let session = Arc::new(Session::new(tx));
        let id = session.id();
        let size = {
            let mut sessions = self.sessions.write();
            session.set_state(SessionState::Open);
            sessions.insert(id, session);
            self.record_size(sessions.len());
            sessions.len()
        };
        debug!(session_id = %id, sessions = size, "session registered");
        Ok(id)
    }

    /// Remove a session. Returns `false` if it was already gone.
    pub fn unregister(&self, id: SessionId) -> bool {
        let (removed, size) = {
            let mut sessions = self.sessions.write();
            let removed = sessions.remove(&id);
            if removed.is_some() {
                self.record_size(sessions.len());
            }
            (removed, sessions.len())
        };

        match removed {
            Some(session) => {
                session.set_state(SessionState::Closing);
                debug!(
                    session_id = %id,
                    sessions = size,
                    age_ms = session.age().as_millis() as u64,
                    "session unregistered"
                );
                session.set_state(SessionState::Closed);
                true
            }
            None => false,
        }
    }

    /// Apply `f` to every session in the `Open` state in a snapshot of the
    /// registry. A session whose receiver has gone is still visited so the
    /// caller sees the failed send and can evict it.
    pub fn for_each(&self, mut f: impl FnMut(&Session)) {
        for session in self.snapshot() {
            if session.state() == SessionState::Open {
                f(&session);
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every session. Their receivers observe the channel ending once
    /// the last sender clone goes away.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            self.record_size(0);
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in &drained {
            session.set_state(SessionState::Closed);
        }
        drained.len()
    }

    /// Called with the write lock held.
    fn record_size(&self, size: usize) {
        self.active_count.store(size, Ordering::Relaxed);
        gauge!("realtime_sessions").set(size as f64);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<Arc<str>>, mpsc::Receiver<Arc<str>>) {
        mpsc::channel(8)
    }

    #[test]
    fn register_adds_open_session() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).unwrap();
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        let mut states = Vec::new();
        registry.for_each(|s| states.push(s.state()));
        assert_eq!(states, vec![SessionState::Open]);
    }

    #[test]
    fn register_closed_channel_fails() {
        let registry = SessionRegistry::new();
        let (tx, rx) = channel();
        drop(rx);
        assert!(matches!(
            registry.register(tx),
            Err(RealtimeError::ChannelClosed)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        let a = registry.register(tx_a).unwrap();
        registry.register(tx_b).unwrap();

        assert!(registry.unregister(a));
        assert_eq!(registry.len(), 1);
        assert!(!registry.unregister(a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn for_each_visits_sessions_whose_receiver_dropped() {
        let registry = SessionRegistry::new();
        let (tx_a, _rx_a) = channel();
        let (tx_b, rx_b) = channel();
        registry.register(tx_a).unwrap();
        let b = registry.register(tx_b).unwrap();
        drop(rx_b);

        let mut dead = Vec::new();
        registry.for_each(|s| {
            if !s.is_open() {
                assert!(matches!(
                    s.try_deliver(Arc::from("x")),
                    Err(TrySendError::Closed(_))
                ));
                dead.push(s.id());
            }
        });
        assert_eq!(dead, vec![b]);
    }

    #[test]
    fn for_each_skips_sessions_closed_mid_iteration() {
        let registry = SessionRegistry::new();
        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        let a = registry.register(tx_a).unwrap();
        let b = registry.register(tx_b).unwrap();

        let mut seen = Vec::new();
        registry.for_each(|s| {
            seen.push(s.id());
            let other = if s.id() == a { b } else { a };
            registry.unregister(other);
        });
        assert_eq!(seen.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_during_iteration_does_not_disturb_it() {
        let registry = SessionRegistry::new();
        let mut keep = Vec::new();
        for _ in 0..4 {
            let (tx, rx) = channel();
            registry.register(tx).unwrap();
            keep.push(rx);
        }

        let mut visited = 0;
        registry.for_each(|s| {
            visited += 1;
            registry.unregister(s.id());
        });
        assert_eq!(visited, 4);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn close_all_ends_receivers() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = channel();
        registry.register(tx).unwrap();

        assert_eq!(registry.close_all(), 1);
        assert!(registry.is_empty());
        assert!(rx.recv().await.is_none());
    }
}
