//! SessionRegistry: the one map shared by every session.
//!
//! Maps each [`ConnectionId`] to its [`SessionNegotiator`].  The map is a
//! `DashMap`, which shards its entries across several internal locks, so
//! sessions on different connections can be created and removed concurrently
//! without contending on one global lock.
//!
//! A registry is built once per process by the host and drained at shutdown;
//! it is never a global.
//!
//! # Serials
//!
//! Every negotiator gets a process-unique serial.  When a session reports its
//! own end, the registry removes it only if the entry still carries that
//! serial, so a late report from an old session can never evict a newer
//! session that reuses the connection id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pokeremote_core::ConnectionId;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::application::negotiate_session::{
    SessionContext, SessionError, SessionNegotiator, SessionSignal,
};

/// Concurrent map of live sessions.
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, Arc<SessionNegotiator>>,
    next_serial: AtomicU64,
    ctx: Arc<SessionContext>,
    signals: mpsc::UnboundedSender<SessionSignal>,
}

impl SessionRegistry {
    /// Creates an empty registry whose sessions report into `signals`.
    pub fn new(ctx: Arc<SessionContext>, signals: mpsc::UnboundedSender<SessionSignal>) -> Self {
        Self {
            sessions: DashMap::new(),
            next_serial: AtomicU64::new(1),
            ctx,
            signals,
        }
    }

    fn build(&self, id: &ConnectionId) -> Arc<SessionNegotiator> {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        Arc::new(SessionNegotiator::new(
            id.clone(),
            serial,
            Arc::clone(&self.ctx),
            self.signals.clone(),
        ))
    }

    /// Registers a new session for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DuplicateSession`] if `id` is already taken.
    pub fn create(&self, id: &ConnectionId) -> Result<Arc<SessionNegotiator>, SessionError> {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateSession(id.clone())),
            Entry::Vacant(slot) => {
                let session = self.build(id);
                slot.insert(Arc::clone(&session));
                debug!(%id, serial = session.serial(), "session registered");
                Ok(session)
            }
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<SessionNegotiator>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the session for `id`, registering a new one if needed.
    pub fn get_or_create(&self, id: &ConnectionId) -> Arc<SessionNegotiator> {
        let entry = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| self.build(id));
        Arc::clone(entry.value())
    }

    /// Removes and closes the session for `id`.  Returns `false` if there was
    /// none.
    pub async fn remove(&self, id: &ConnectionId) -> bool {
        // The map guard is gone before `close` awaits.
        let removed = self.sessions.remove(id);
        match removed {
            Some((_, session)) => {
                session.close().await;
                info!(%id, "session removed");
                true
            }
            None => false,
        }
    }

    /// Removes the session for `id` only if it is still the one with `serial`.
    pub async fn remove_if_serial(&self, id: &ConnectionId, serial: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(id, |_, session| session.serial() == serial);
        match removed {
            Some((_, session)) => {
                session.close().await;
                info!(%id, serial, "session removed");
                true
            }
            None => false,
        }
    }

    /// Closes and removes every session.  Returns how many were removed.
    pub async fn drain(&self) -> usize {
        let ids = self.ids();
        let mut removed = 0;
        for id in ids {
            if self.remove(&id).await {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of all registered sessions, in no particular order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
