//! Session storage.
//!
//! Route handlers talk to a [`SessionStore`] rather than to a concrete
//! backend, so the RBAC logic does not depend on where sessions live. The
//! gateway ships with [`InMemorySessionStore`]: sessions are per process and
//! vanish on restart.

use crate::error::{Result, SessionStoreError};
use crate::session::{SessionId, SessionRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Trait for session storage operations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads a session. Expired sessions are reported as absent.
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionStoreError>;

    /// Inserts or replaces a session.
    async fn put(&self, id: &SessionId, record: SessionRecord) -> Result<(), SessionStoreError>;

    /// Deletes a session. Deleting an unknown session is not an error.
    async fn delete(&self, id: &SessionId) -> Result<(), SessionStoreError>;

    /// Removes all expired sessions and returns how many were removed.
    async fn delete_expired(&self) -> Result<usize, SessionStoreError>;
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns true if no sessions are stored.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionStoreError> {
        let record = self.sessions.read().await.get(id).cloned();
        match record {
            Some(record) if record.is_expired() => {
                self.sessions.write().await.remove(id);
                tracing::debug!(session_id = %id, "Dropped expired session on read");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(&self, id: &SessionId, record: SessionRecord) -> Result<(), SessionStoreError> {
        self.sessions.write().await.insert(id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionStoreError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<usize, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired());
        Ok(before - sessions.len())
    }
}
