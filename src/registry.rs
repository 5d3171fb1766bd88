//! Registry of live session handles.
//!
//! `SessionRegistry` stores non-owning weak references to session event
//! sinks, allowing owners (accept loops, admin surfaces) to reach live
//! sessions without preventing their cleanup. Dead entries can be pruned
//! opportunistically or lazily at lookup time.

use std::sync::{
    Weak,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::context::{ReplySink, SinkInner};
use crate::session::event::SessionEvent;

/// Identifier assigned to a session at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl From<u64> for SessionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Owner-side handle to a live session.
///
/// Obtained from [`SessionRegistry::get`] or
/// [`McServerSession::handle`](crate::session::McServerSession::handle).
#[derive(Clone)]
pub struct SessionHandle {
    inner: std::sync::Arc<SinkInner>,
}

impl SessionHandle {
    pub(crate) fn from_sink(sink: &ReplySink) -> Self {
        Self {
            inner: sink.0.clone(),
        }
    }

    fn downgrade(&self) -> Weak<SinkInner> {
        std::sync::Arc::downgrade(&self.inner)
    }

    /// Request a graceful close. Idempotent; a no-op once the session is
    /// gone.
    pub fn close(&self) {
        let _ = self.inner.tx.send(SessionEvent::Close);
    }
}

/// Concurrent registry of session handles keyed by [`SessionId`].
#[derive(Default)]
pub struct SessionRegistry(DashMap<SessionId, Weak<SinkInner>>);

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a handle for `id` if the session is still alive.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.0
            .get(id)
            .and_then(|weak| weak.upgrade())
            .map(|inner| SessionHandle { inner })
    }

    /// Insert a handle for a newly constructed session.
    pub fn insert(&self, id: SessionId, handle: &SessionHandle) {
        self.0.insert(id, handle.downgrade());
    }

    /// Remove a handle, typically from an `on_close_finish` hook.
    pub fn remove(&self, id: &SessionId) {
        self.0.remove(id);
    }

    /// Drop entries whose sessions have terminated.
    pub fn prune(&self) {
        self.0.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of registered (not necessarily live) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn sink() -> ReplySink {
        let (tx, _rx) = mpsc::unbounded_channel();
        ReplySink::new(tx)
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(SessionId::next(), SessionId::next());
    }

    #[test]
    fn registry_drops_dead_sessions() {
        let registry = SessionRegistry::new();
        let id = SessionId::next();
        let sink = sink();
        let handle = SessionHandle::from_sink(&sink);
        registry.insert(id, &handle);
        assert!(registry.get(&id).is_some());

        drop(handle);
        drop(sink);
        assert!(registry.get(&id).is_none());

        registry.prune();
        assert!(registry.is_empty());
    }
}
