//! Append, persist, broadcast and catch-up for sessions.
//!
//! A viewer joining a session is registered first and served history second,
//! and both steps run under the same per-session lock that appends take.
//! Every message appended before the join is therefore in the catch-up batch,
//! and every message appended after it arrives by broadcast, exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::directory::UserDirectory;
use crate::error::{Result, SyncError};
use crate::persistence::{ListFilter, SessionStore, StoreError};
use crate::registry::{Connection, ConnectionRegistry, Frame};
use crate::session::{Message, Session, select_unanswered};

/// One async lock per session id, dropped once nobody holds or awaits it.
#[derive(Debug, Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Orchestrates the session write path and live delivery.
#[derive(Debug, Clone)]
pub struct SessionSynchronizer {
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn UserDirectory>,
    registry: ConnectionRegistry,
    locks: Arc<SessionLocks>,
}

impl SessionSynchronizer {
    pub fn new(
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn UserDirectory>,
        registry: ConnectionRegistry,
    ) -> Self {
        Self {
            store,
            directory,
            registry,
            locks: Arc::default(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Return session `session_id`, or create and persist a new empty one
    /// when no id is given.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        title: &str,
        owner_user_id: &str,
    ) -> Result<Session> {
        if let Some(id) = session_id {
            return self.session(id).await;
        }

        let session = self.store.upsert(&Session::new(title, owner_user_id)).await?;
        info!(
            name: "session.created",
            session_id = %session.uuid,
            owner = %owner_user_id,
            "Session created"
        );
        Ok(session)
    }

    /// Fetch one session.
    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| SyncError::SessionNotFound(session_id.to_string()))
    }

    pub async fn list(&self, filter: ListFilter) -> Result<Vec<Session>> {
        Ok(self.store.list(filter).await?)
    }

    /// Sessions awaiting an answer that `viewer_id` did not ask, newest first.
    pub async fn list_unanswered(
        &self,
        viewer_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Session>> {
        let sessions = self.store.list(ListFilter::non_empty()).await?;
        Ok(select_unanswered(sessions, viewer_id, limit))
    }

    /// Append a message by `author_user_id` and push it to live viewers.
    ///
    /// Nothing is written or broadcast if the author cannot be resolved or the
    /// session does not exist. A write acknowledged too late is re-read and
    /// broadcast if it landed.
    pub async fn append(
        &self,
        session_id: &str,
        author_user_id: &str,
        text: &str,
        is_answer: bool,
    ) -> Result<Session> {
        let message = self.compose(author_user_id, text, is_answer).await?;

        let _guard = self.locks.acquire(session_id).await;

        let mut session = self.session(session_id).await?;
        let position = session.content.len();
        session.push(message.clone());

        let session = match self.store.upsert(&session).await {
            Ok(stored) => stored,
            Err(StoreError::Timeout(limit)) => {
                self.reconcile(session_id, position, &message, limit).await?
            }
            Err(e) => return Err(e.into()),
        };
        let delivered = self.registry.broadcast(session_id, &message);

        info!(
            name: "session.appended",
            session_id,
            author = %author_user_id,
            is_answer,
            position = session.content.len(),
            delivered,
            "Message appended"
        );
        Ok(session)
    }

    /// Create a session whose first message is already in place, written once.
    ///
    /// Nothing is stored if the author cannot be resolved or the text is empty.
    pub async fn start(
        &self,
        title: &str,
        author_user_id: &str,
        text: &str,
        is_answer: bool,
    ) -> Result<Session> {
        let message = self.compose(author_user_id, text, is_answer).await?;

        let mut session = Session::new(title, author_user_id);
        session.push(message);
        let session = self.store.upsert(&session).await?;

        info!(
            name: "session.created",
            session_id = %session.uuid,
            owner = %author_user_id,
            is_answer,
            "Session created with first message"
        );
        Ok(session)
    }

    async fn compose(&self, author_user_id: &str, text: &str, is_answer: bool) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(SyncError::Validation("message content is empty".into()));
        }

        let author = self.directory.resolve_public(author_user_id).await?;
        Ok(Message {
            user_id: author.uuid,
            display_name: author.display_name,
            avatar_url: author.avatar_url,
            content: text.to_string(),
            is_answer,
        })
    }

    /// Decide the outcome of a write whose acknowledgement timed out.
    ///
    /// Runs under the session guard, so `position` is still the slot the
    /// message was written to. If it landed the write counts as done.
    async fn reconcile(
        &self,
        session_id: &str,
        position: usize,
        message: &Message,
        limit: Duration,
    ) -> Result<Session> {
        let current = self.session(session_id).await?;
        if current.content.get(position) == Some(message) {
            warn!(
                name: "session.append.late_ack",
                session_id,
                position,
                "Write landed after its acknowledgement timed out"
            );
            Ok(current)
        } else {
            Err(StoreError::Timeout(limit).into())
        }
    }

    /// Register `connection` and send it the full history.
    ///
    /// On failure the registration is rolled back, restoring any connection
    /// it displaced, and `false` is returned so the caller can close it.
    pub async fn join(&self, connection: &Connection, session_id: &str, user_id: &str) -> bool {
        let _guard = self.locks.acquire(session_id).await;

        let replaced = self.registry.connect(session_id, user_id, connection.clone());

        if self.send_history(connection, session_id, user_id).await {
            return true;
        }

        self.registry.disconnect(connection);
        if let Some(previous) = replaced {
            self.registry.connect(session_id, user_id, previous);
        }
        false
    }

    /// Send the full history of `session_id` to an already registered
    /// `connection` as a single batch.
    ///
    /// Returns `false` instead of an error on any failure.
    pub async fn catch_up(&self, connection: &Connection, session_id: &str, user_id: &str) -> bool {
        let _guard = self.locks.acquire(session_id).await;
        self.send_history(connection, session_id, user_id).await
    }

    async fn send_history(&self, connection: &Connection, session_id: &str, user_id: &str) -> bool {
        let session = match self.session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    name: "session.catch_up.failed",
                    session_id,
                    user_id,
                    not_found = e.is_not_found(),
                    error = %e,
                    "Catch-up failed"
                );
                return false;
            }
        };

        let count = session.content.len();
        if !connection.send(Frame::Messages(session.content)) {
            warn!(
                name: "session.catch_up.closed",
                session_id,
                user_id,
                "Connection closed before catch-up"
            );
            return false;
        }

        info!(
            name: "session.caught_up",
            session_id,
            user_id,
            messages = count,
            "Viewer caught up"
        );
        true
    }
}
