//! In-process document store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::directory::UserSecret;
use crate::persistence::{ListFilter, SessionStore, StoreError, UserStore};
use crate::session::Session;

/// Thread-safe in-memory store for sessions and user records.
///
/// Documents are cloned in and out, so callers never share state with the
/// stored copy.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    users: RwLock<HashMap<String, UserSecret>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn upsert(&self, session: &Session) -> Result<Session, StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.uuid.clone(), session.clone());
        Ok(session.clone())
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserSecret>, StoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn put_user(&self, user: &UserSecret) -> Result<(), StoreError> {
        self.users
            .write()
            .await
            .insert(user.uuid.clone(), user.clone());
        Ok(())
    }
}
