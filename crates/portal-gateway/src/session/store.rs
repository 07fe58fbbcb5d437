//! Session storage.
//!
//! Handlers only see the [`SessionStore`] trait so a shared store (Redis,
//! database) can replace the in-memory one without touching them.

use crate::session::state::{AuthState, SessionError};
use common::types::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-place change to a stored session, run under the store's lock.
pub type SessionUpdate = Box<dyn FnOnce(&mut AuthState) -> Result<(), SessionError> + Send>;

/// Storage for signed-in sessions, keyed by session id.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &SessionId) -> Option<AuthState>;

    /// Store a new session. An existing entry under `id` is replaced.
    async fn insert(&self, id: SessionId, state: AuthState);

    /// Apply `update` to the session stored under `id`, atomically with
    /// respect to every other change to it.
    ///
    /// Returns `None` if `id` is unknown. `Some(Ok(state))` carries a copy
    /// of the stored result; on `Some(Err(_))` the record is left untouched.
    async fn modify(
        &self,
        id: &SessionId,
        update: SessionUpdate,
    ) -> Option<Result<AuthState, SessionError>>;

    async fn remove(&self, id: &SessionId) -> Option<AuthState>;

    /// Drop every session that can no longer be used or refreshed at `now`.
    /// Returns the number removed.
    async fn remove_stale(&self, now: i64) -> usize;

    async fn count(&self) -> usize;
}

/// Process-local session store.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, AuthState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Option<AuthState> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn insert(&self, id: SessionId, state: AuthState) {
        self.sessions.write().await.insert(id, state);
    }

    async fn modify(
        &self,
        id: &SessionId,
        update: SessionUpdate,
    ) -> Option<Result<AuthState, SessionError>> {
        let mut sessions = self.sessions.write().await;
        let existing = sessions.get_mut(id)?;
        let mut next = existing.clone();
        Some(update(&mut next).map(|()| {
            *existing = next.clone();
            next
        }))
    }

    async fn remove(&self, id: &SessionId) -> Option<AuthState> {
        self.sessions.write().await.remove(id)
    }

    async fn remove_stale(&self, now: i64) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, state| !state.is_stale_at(now));
        before - sessions.len()
    }

    async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
