use crate::directory::UserSecret;
use crate::persistence::{ListFilter, SessionStore, StoreError, UserStore};
use crate::session::Session;
use async_trait::async_trait;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};

const SESSIONS: &str = "sessions";
const USERS: &str = "users";

#[derive(Debug)]
pub struct SurrealDbProvider {
    db: Surreal<Any>,
}

impl SurrealDbProvider {
    /// Connect to `connection_string` (e.g. `ws://localhost:8000` or
    /// `surrealkv://data/relay`) and select the namespace and database.
    pub async fn new(
        connection_string: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, StoreError> {
        let db = connect(connection_string).await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(Self { db })
    }
}

#[async_trait]
impl SessionStore for SurrealDbProvider {
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let session: Option<Session> = self.db.select((SESSIONS, id)).await?;
        Ok(session)
    }

    async fn upsert(&self, session: &Session) -> Result<Session, StoreError> {
        // Full-document replace keyed by uuid
        let stored: Option<Session> = self
            .db
            .upsert((SESSIONS, session.uuid.as_str()))
            .content(session.clone())
            .await?;
        Ok(stored.unwrap_or_else(|| session.clone()))
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Session>, StoreError> {
        let sessions: Vec<Session> = self.db.select(SESSIONS).await?;
        Ok(sessions.into_iter().filter(|s| filter.matches(s)).collect())
    }
}

#[async_trait]
impl UserStore for SurrealDbProvider {
    async fn get_user(&self, id: &str) -> Result<Option<UserSecret>, StoreError> {
        let user: Option<UserSecret> = self.db.select((USERS, id)).await?;
        Ok(user)
    }

    async fn put_user(&self, user: &UserSecret) -> Result<(), StoreError> {
        let _: Option<UserSecret> = self
            .db
            .upsert((USERS, user.uuid.as_str()))
            .content(user.clone())
            .await?;
        Ok(())
    }
}
