//! Chat Stream
//!
//! A small chat server that answers a question within a caller-chosen
//! session and delivers the reply character by character over Server-Sent
//! Events, keeping each session's conversation history in memory.
//!
//! # Architecture
//!
//! - **Server**: Axum-based HTTP server with SSE streaming
//! - **Stream Coordinator**: Drives one exchange and records exactly what was streamed
//! - **Session Store**: Concurrency-safe, in-memory conversation history
//! - **Reply Generators**: Pluggable backends that turn a question into text
//!
//! # Modules
//!
//! - [`config`]: CLI and layered configuration
//! - [`error`]: Service error type and HTTP mapping
//! - [`reply`]: Reply generator trait and backends
//! - [`session`]: Conversation and session management
//! - [`stream`]: Frames, SSE encoding and the exchange coordinator

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod reply;
pub mod server;
pub mod session;
pub mod stream;

use crate::config::AppConfig;

use reply::ReplyGenerator;
use session::SessionStore;
use std::sync::Arc;
use stream::StreamCoordinator;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Exchange coordinator for the streaming endpoint.
    pub coordinator: StreamCoordinator,
    /// Session store for history lookups.
    pub sessions: SessionStore,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire a session store and reply backend into handler state.
    pub fn new(
        sessions: SessionStore,
        generator: Arc<dyn ReplyGenerator>,
        config: Arc<AppConfig>,
    ) -> Self {
        let coordinator =
            StreamCoordinator::new(sessions.clone(), generator, config.stream.pacing());
        Self {
            coordinator,
            sessions,
            config,
        }
    }
}
