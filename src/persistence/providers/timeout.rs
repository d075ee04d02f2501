//! Time-bounded wrapper around any document backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::directory::UserSecret;
use crate::persistence::{DocumentStore, ListFilter, SessionStore, StoreError, UserStore};
use crate::session::Session;

/// Applies one deadline to every backend call so a stalled store cannot pin a
/// connection task forever. Expired calls fail with [`StoreError::Timeout`].
#[derive(Debug, Clone)]
pub struct TimeoutStore {
    inner: Arc<dyn DocumentStore>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn DocumentStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        if let Ok(result) = tokio::time::timeout(self.limit, fut).await {
            result
        } else {
            tracing::warn!(
                name: "store.timeout",
                op,
                limit = ?self.limit,
                "Store call timed out"
            );
            Err(StoreError::Timeout(self.limit))
        }
    }
}

#[async_trait]
impl SessionStore for TimeoutStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.bounded("session.get", self.inner.get(id)).await
    }

    async fn upsert(&self, session: &Session) -> Result<Session, StoreError> {
        self.bounded("session.upsert", self.inner.upsert(session)).await
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Session>, StoreError> {
        self.bounded("session.list", self.inner.list(filter)).await
    }
}

#[async_trait]
impl UserStore for TimeoutStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserSecret>, StoreError> {
        self.bounded("user.get", self.inner.get_user(id)).await
    }

    async fn put_user(&self, user: &UserSecret) -> Result<(), StoreError> {
        self.bounded("user.put", self.inner.put_user(user)).await
    }
}
