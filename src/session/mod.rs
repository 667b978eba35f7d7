//! Session and conversation history management.
//!
//! This module provides in-memory session storage for keeping conversation
//! state across requests. Sessions are identified by caller-chosen keys and
//! contain the ordered message history. Nothing here survives a restart.
//!
//! # Architecture
//!
//! - [`Message`]: A single `user` or `assistant` entry
//! - [`Session`]: Shared handle to one conversation
//! - [`SessionStore`]: Thread-safe map of all known sessions
//!
//! # Example
//!
//! ```rust
//! use chat_stream::session::{Message, SessionStore};
//!
//! let store = SessionStore::new();
//! let _session = store.get_or_create("demo");
//! store.append("demo", Message::user("Hello!")).unwrap();
//!
//! assert_eq!(store.history("demo").len(), 1);
//! assert!(store.history("unknown").is_empty());
//! ```

mod message;
mod thread;

pub use message::{Message, MessageRole};
pub use thread::{Session, SessionStore, TurnGuard};
