//! Live viewer connections, grouped by session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::session::Message;

/// A frame pushed to a viewer.
///
/// Message frames are always arrays, whether they carry a catch-up batch or
/// a single broadcast message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Frame {
    Messages(Vec<Message>),
    Error { error: String },
}

/// Sending half of one viewer's outbound queue.
///
/// Two handles are the same connection only if they came from the same
/// [`Connection::channel`] call.
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    tx: mpsc::UnboundedSender<Frame>,
}

impl Connection {
    /// Create a connection handle and the receiver its socket task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a frame. Returns `false` once the receiving side is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.tx.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

/// session id -> viewing user id -> connection
type Table = HashMap<String, HashMap<String, Connection>>;

/// Tracks which connections are watching which session.
///
/// Entries are keyed by the (session id, user id) pair, so two viewers of one
/// session never displace each other and a session id is only ever compared
/// whole against another session id. All operations take the same lock.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    table: Arc<Mutex<Table>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        // Every mutation leaves the table consistent, so a poisoned lock is still usable.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `connection` for `user_id` watching `session_id`.
    ///
    /// A previous connection under the same pair is replaced and returned.
    pub fn connect(
        &self,
        session_id: &str,
        user_id: &str,
        connection: Connection,
    ) -> Option<Connection> {
        let replaced = self
            .table()
            .entry(session_id.to_string())
            .or_default()
            .insert(user_id.to_string(), connection);

        if let Some(old) = &replaced {
            debug!(
                name: "registry.connection.replaced",
                session_id,
                user_id,
                connection_id = %old.id(),
                "Replaced earlier connection"
            );
        }
        replaced
    }

    /// Remove `connection` wherever it is registered.
    ///
    /// Returns `false` if it was not registered, including when it has
    /// already been removed or replaced.
    pub fn disconnect(&self, connection: &Connection) -> bool {
        let mut table = self.table();

        let found = table.iter().find_map(|(session_id, viewers)| {
            viewers
                .iter()
                .find(|(_, c)| *c == connection)
                .map(|(user_id, _)| (session_id.clone(), user_id.clone()))
        });

        let Some((session_id, user_id)) = found else {
            return false;
        };

        if let Some(viewers) = table.get_mut(&session_id) {
            viewers.remove(&user_id);
            if viewers.is_empty() {
                table.remove(&session_id);
            }
        }

        debug!(
            name: "registry.connection.removed",
            session_id = %session_id,
            user_id = %user_id,
            connection_id = %connection.id(),
            "Connection removed"
        );
        true
    }

    /// Connections currently registered for `session_id`.
    pub fn snapshot(&self, session_id: &str) -> Vec<Connection> {
        self.table()
            .get(session_id)
            .map(|viewers| viewers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver `message` to every viewer of `session_id`.
    ///
    /// The recipient set is copied under the lock and sent to afterwards.
    /// Returns how many connections accepted the frame.
    pub fn broadcast(&self, session_id: &str, message: &Message) -> usize {
        let recipients = self.snapshot(session_id);
        let frame = Frame::Messages(vec![message.clone()]);

        let delivered = recipients
            .iter()
            .filter(|c| c.send(frame.clone()))
            .count();

        debug!(
            name: "registry.broadcast",
            session_id,
            recipients = recipients.len(),
            delivered,
            "Broadcast message"
        );
        delivered
    }

    /// Number of viewers watching `session_id`.
    pub fn viewers(&self, session_id: &str) -> usize {
        self.table().get(session_id).map_or(0, HashMap::len)
    }

    /// Total number of registered connections.
    pub fn len(&self) -> usize {
        self.table().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
