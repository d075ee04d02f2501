//! Session and message data model.
//!
//! A [`Session`] is a single question thread: the asker's opening message
//! followed by any number of answers, stored as one document keyed by its
//! `uuid`. Messages carry a denormalized snapshot of their author's public
//! projection so history never has to be re-resolved.
//!
//! # Architecture
//!
//! - [`Session`]: The canonical stored document
//! - [`Message`]: One immutable entry in a session's content
//! - [`SessionSummary`]: Metadata-only projection served by listing endpoints
//!
//! # Example
//!
//! ```rust
//! use qa_relay::session::{Message, Session};
//!
//! let mut session = Session::new("Is C++ faster than Rust?", "user-1");
//! session.push(Message {
//!     user_id: "user-1".into(),
//!     display_name: "Curious Otter".into(),
//!     avatar_url: String::new(),
//!     content: "Benchmarks welcome.".into(),
//!     is_answer: false,
//! });
//!
//! assert_eq!(session.content.len(), 1);
//! assert!(session.is_awaiting_answer());
//! ```

mod thread;

pub use thread::{Message, Session, SessionSummary, select_unanswered};
