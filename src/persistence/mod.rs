use crate::config::PersistenceConfig;
use crate::directory::UserSecret;
use crate::session::Session;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod providers;

use providers::{memory::InMemoryStore, surreal::SurrealDbProvider, timeout::TimeoutStore};

/// Errors surfaced by a storage backend.
///
/// None of these are retried by the store itself.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// The backend did not answer within the configured bound.
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// The configured provider name is not known.
    #[error("Unknown persistence provider: {0}")]
    UnknownProvider(String),
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Filter applied by [`SessionStore::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Skip sessions that have no messages yet.
    pub exclude_empty: bool,
}

impl ListFilter {
    /// Every stored session.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only sessions with at least one message.
    pub fn non_empty() -> Self {
        Self {
            exclude_empty: true,
        }
    }

    pub fn matches(&self, session: &Session) -> bool {
        !self.exclude_empty || !session.content.is_empty()
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Point lookup by session uuid.
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Replace the whole document keyed by `session.uuid`, creating it if absent.
    async fn upsert(&self, session: &Session) -> Result<Session, StoreError>;

    /// List stored sessions matching `filter`.
    async fn list(&self, filter: ListFilter) -> Result<Vec<Session>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync + std::fmt::Debug {
    async fn get_user(&self, id: &str) -> Result<Option<UserSecret>, StoreError>;
    async fn put_user(&self, user: &UserSecret) -> Result<(), StoreError>;
}

/// A backend that holds both session and user documents.
pub trait DocumentStore: SessionStore + UserStore {}

impl<T: SessionStore + UserStore> DocumentStore for T {}

/// Open the configured provider, wrapped so every call is time-bounded.
pub async fn open(config: &PersistenceConfig) -> Result<Arc<TimeoutStore>, StoreError> {
    let backend: Arc<dyn DocumentStore> = match config.provider.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "surrealdb" => Arc::new(
            SurrealDbProvider::new(&config.database_url, &config.namespace, &config.database)
                .await?,
        ),
        other => return Err(StoreError::UnknownProvider(other.to_string())),
    };

    Ok(Arc::new(TimeoutStore::new(
        backend,
        Duration::from_millis(config.timeout_ms),
    )))
}
