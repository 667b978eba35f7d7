//! Conversation thread and session storage.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::Message;
use crate::error::{Error, Result};

/// Exclusive right to run one question/reply exchange on a session.
///
/// Held from the moment the user message is appended until the assistant
/// message is committed or the exchange is abandoned.
pub type TurnGuard = OwnedMutexGuard<()>;

/// A single conversation session.
///
/// Cloning yields another handle to the same conversation.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Caller-supplied session identifier.
    id: String,
    /// Conversation messages, append-only.
    messages: RwLock<Vec<Message>>,
    /// Serializes exchanges on this session.
    turn: Arc<Mutex<()>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Create a new session with the given ID.
    fn new(id: String) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                messages: RwLock::new(Vec::new()),
                turn: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Add a message to the end of the conversation.
    pub fn add_message(&self, message: Message) {
        write(&self.inner.messages).push(message);
    }

    /// Get a snapshot of all messages in the conversation.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        read(&self.inner.messages).clone()
    }

    /// Get the number of messages in the conversation.
    #[must_use]
    pub fn message_count(&self) -> usize {
        read(&self.inner.messages).len()
    }

    /// Wait for exclusive use of this session for one exchange.
    pub async fn begin_turn(&self) -> TurnGuard {
        Arc::clone(&self.inner.turn).lock_owned().await
    }

    /// Whether two handles refer to the same underlying session.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

/// Thread-safe store for sessions.
///
/// The map lock is only held for lookups and inserts; each session guards
/// its own history, so traffic on one session never waits on another.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty session store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Get a session by ID without creating it.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        read(&self.inner.sessions).get(id).cloned()
    }

    /// Get a session by ID, registering an empty one if it doesn't exist.
    ///
    /// Every call with the same ID returns a handle to the same session.
    #[must_use]
    pub fn get_or_create(&self, id: &str) -> Session {
        if let Some(session) = self.get(id) {
            return session;
        }

        // Re-checked under the write lock: another task may have won the race.
        write(&self.inner.sessions)
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, "Created session");
                Session::new(id.to_string())
            })
            .clone()
    }

    /// Append a message to an existing session.
    pub fn append(&self, id: &str, message: Message) -> Result<()> {
        let session = self
            .get(id)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        session.add_message(message);
        Ok(())
    }

    /// Get the message history of a session, empty if the ID is unknown.
    #[must_use]
    pub fn history(&self, id: &str) -> Vec<Message> {
        self.get(id).map(|s| s.messages()).unwrap_or_default()
    }

    /// Get the number of known sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.inner.sessions).len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
