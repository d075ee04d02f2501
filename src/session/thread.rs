//! Session documents and the unanswered-session selection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single message in a session.
///
/// Author fields are copied from the directory when the message is sent and
/// are not re-resolved afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: String,
    pub content: String,
    pub is_answer: bool,
}

/// A question thread with its ordered message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier.
    pub uuid: String,
    /// User who asked the question.
    pub owner_user_id: String,
    pub title: String,
    /// Creation date, set once.
    pub created_at: NaiveDate,
    /// Last append time.
    pub updated_at: DateTime<Utc>,
    /// Messages in arrival order.
    #[serde(default)]
    pub content: Vec<Message>,
}

impl Session {
    /// Create an empty session with a freshly allocated id.
    pub fn new(title: impl Into<String>, owner_user_id: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), title, owner_user_id)
    }

    /// Create an empty session with a specific id.
    pub fn with_id(
        uuid: impl Into<String>,
        title: impl Into<String>,
        owner_user_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            uuid: uuid.into(),
            owner_user_id: owner_user_id.into(),
            title: title.into(),
            created_at: now.date_naive(),
            updated_at: now,
            content: Vec::new(),
        }
    }

    /// Append a message and bump `updated_at`.
    pub fn push(&mut self, message: Message) {
        self.push_at(message, Utc::now());
    }

    /// Append a message observed at `now`.
    ///
    /// `updated_at` never moves backwards, even if the wall clock does.
    pub fn push_at(&mut self, message: Message, now: DateTime<Utc>) {
        self.content.push(message);
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// The most recent message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.content.last()
    }

    /// True when the latest message is a question rather than an answer.
    #[must_use]
    pub fn is_awaiting_answer(&self) -> bool {
        self.last_message().is_some_and(|m| !m.is_answer)
    }

    /// Metadata-only view of this session.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            uuid: self.uuid.clone(),
            title: self.title.clone(),
            owner_user_id: self.owner_user_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.content.len(),
            last_message: self.last_message().cloned(),
        }
    }
}

/// Session metadata without the full message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub uuid: String,
    pub title: String,
    pub owner_user_id: String,
    pub created_at: NaiveDate,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
}

/// Pick the sessions `viewer_id` could answer, newest first.
///
/// A session qualifies when its last message is not an answer and the viewer
/// does not own it. `limit` keeps only the most recently updated ones.
pub fn select_unanswered(
    sessions: impl IntoIterator<Item = Session>,
    viewer_id: &str,
    limit: Option<usize>,
) -> Vec<Session> {
    let mut open: Vec<Session> = sessions
        .into_iter()
        .filter(|s| s.owner_user_id != viewer_id && s.is_awaiting_answer())
        .collect();

    open.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    if let Some(limit) = limit {
        open.truncate(limit);
    }
    open
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(user: &str, text: &str, is_answer: bool) -> Message {
        Message {
            user_id: user.to_string(),
            display_name: format!("{user}-name"),
            avatar_url: format!("https://avatars.test/{user}"),
            content: text.to_string(),
            is_answer,
        }
    }

    #[test]
    fn test_push_preserves_order() {
        let mut session = Session::new("ordering", "owner");
        for i in 0..5 {
            session.push(message("owner", &format!("m{i}"), false));
        }

        assert_eq!(session.content.len(), 5);
        for (i, m) in session.content.iter().enumerate() {
            assert_eq!(m.content, format!("m{i}"));
        }
    }

    #[test]
    fn test_updated_at_never_moves_backwards() {
        let mut session = Session::new("clock", "owner");
        let start = session.updated_at;

        session.push_at(message("owner", "later", false), start + Duration::seconds(5));
        let bumped = session.updated_at;
        assert!(bumped > start);

        session.push_at(message("owner", "skewed", false), start - Duration::seconds(60));
        assert_eq!(session.updated_at, bumped);
    }

    #[test]
    fn test_summary_omits_history() {
        let mut session = Session::new("summary", "owner");
        session.push(message("owner", "q", false));
        session.push(message("other", "a", true));

        let summary = session.summary();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.last_message.unwrap().content, "a");

        let json = serde_json::to_value(session.summary()).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["ownerUserId"], "owner");
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let json = serde_json::to_value(message("u1", "hello", true)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "userId": "u1",
                "displayName": "u1-name",
                "avatarUrl": "https://avatars.test/u1",
                "content": "hello",
                "isAnswer": true,
            })
        );
    }

    #[test]
    fn test_select_unanswered_filters_and_orders() {
        let now = Utc::now();

        let mut mine = Session::with_id("mine", "mine", "viewer");
        mine.push_at(message("viewer", "my question", false), now);

        let mut answered = Session::with_id("answered", "answered", "asker");
        answered.push_at(message("asker", "q", false), now);
        answered.push_at(message("helper", "a", true), now);

        let empty = Session::with_id("empty", "empty", "asker");

        let mut older = Session::with_id("older", "older", "asker");
        older.updated_at = now - Duration::minutes(10);
        older.push_at(message("asker", "q", false), now - Duration::minutes(10));

        let mut newer = Session::with_id("newer", "newer", "asker");
        newer.push_at(message("asker", "q", false), now + Duration::minutes(1));

        let picked = select_unanswered(
            vec![mine, answered, empty, older, newer],
            "viewer",
            None,
        );
        let ids: Vec<&str> = picked.iter().map(|s| s.uuid.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[test]
    fn test_select_unanswered_truncates_to_newest() {
        let now = Utc::now();
        let sessions: Vec<Session> = (0..5)
            .map(|i| {
                let mut s = Session::with_id(format!("s{i}"), "t", "asker");
                s.push_at(message("asker", "q", false), now + Duration::seconds(i));
                s
            })
            .collect();

        let picked = select_unanswered(sessions, "viewer", Some(2));
        let ids: Vec<&str> = picked.iter().map(|s| s.uuid.as_str()).collect();
        assert_eq!(ids, vec!["s4", "s3"]);
    }
}
