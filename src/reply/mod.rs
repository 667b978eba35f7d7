//! Reply generation backends.
//!
//! A [`ReplyGenerator`] turns a question into a complete reply string. The
//! streaming core never looks inside a generator; any backend that can
//! produce text can be plugged in.
//!
//! # Backends
//!
//! - [`CannedReplies`]: Fixed trigger table with a templated fallback
//! - [`ChatCompletionsReplies`]: OpenAI-compatible `/v1/chat/completions`
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_stream::reply::{CannedReplies, ReplyGenerator};
//!
//! let replies = CannedReplies::default();
//! let reply = replies.generate("xyz").await?;
//! assert!(reply.contains("xyz"));
//! ```

pub mod canned;
pub mod chat_completions;

pub use canned::CannedReplies;
pub use chat_completions::ChatCompletionsReplies;

use std::sync::Arc;

use thiserror::Error;

use crate::config::ReplyConfig;
use crate::error::{Error as AppError, Result};

/// Failure to produce a reply.
#[derive(Error, Debug)]
pub enum ReplyError {
    /// Transport-level failure talking to a remote backend.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered, but not with a usable reply.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The backend is not able to answer right now.
    #[error("Reply backend unavailable: {0}")]
    Unavailable(String),
}

/// Produces a complete reply for a question.
///
/// Implementations must not retain per-question state.
#[async_trait::async_trait]
pub trait ReplyGenerator: Send + Sync + std::fmt::Debug {
    /// Generate the full reply text for `question`.
    ///
    /// # Errors
    ///
    /// Returns an error if no reply could be produced.
    async fn generate(&self, question: &str) -> std::result::Result<String, ReplyError>;
}

/// Build the reply backend selected by configuration.
pub fn from_config(config: &ReplyConfig) -> Result<Arc<dyn ReplyGenerator>> {
    match config.provider.as_str() {
        "canned" => Ok(Arc::new(CannedReplies::default())),
        "chat_completions" => {
            let base_url = config
                .base_url
                .clone()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| AppError::Config("reply.base_url is required".to_string()))?;
            let model = config
                .model
                .clone()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| AppError::Config("reply.model is required".to_string()))?;

            let mut backend = ChatCompletionsReplies::new(base_url, model);
            if let Some(key) = config.api_key.clone().filter(|s| !s.trim().is_empty()) {
                backend = backend.with_api_key(key);
            }
            if let Some(prompt) = config.system_prompt.clone() {
                backend = backend.with_system_prompt(prompt);
            }
            Ok(Arc::new(backend))
        }
        other => Err(AppError::Config(format!("unknown reply provider: {other}"))),
    }
}
