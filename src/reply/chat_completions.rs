//! OpenAI-compatible Chat Completions backend.
//!
//! Sends the question as a single non-streaming request to
//! `/v1/chat/completions` and returns the first choice's message content.

use serde_json::{Value, json};

use super::{ReplyError, ReplyGenerator};

/// Reply backend for any OpenAI-compatible Chat Completions endpoint.
#[derive(Clone)]
pub struct ChatCompletionsReplies {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: Option<String>,
}

impl std::fmt::Debug for ChatCompletionsReplies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsReplies")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("system_prompt", &self.system_prompt)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsReplies {
    /// Create a backend for the given endpoint and model.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            system_prompt: None,
        }
    }

    /// Authenticate with a bearer key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Prepend a system prompt to every request.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, question: &str) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = &self.system_prompt {
            messages.push(json!({ "role": "system", "content": prompt }));
        }
        messages.push(json!({ "role": "user", "content": question }));

        json!({
            "model": self.model,
            "stream": false,
            "messages": messages,
        })
    }
}

/// Pull the reply text out of a Chat Completions response body.
fn extract_content(body: &Value) -> Result<String, ReplyError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ReplyError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

#[async_trait::async_trait]
impl ReplyGenerator for ChatCompletionsReplies {
    async fn generate(&self, question: &str) -> Result<String, ReplyError> {
        let mut rb = self
            .http
            .post(self.endpoint())
            .json(&self.request_body(question));
        if let Some(k) = &self.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ReplyError::Unavailable(format!("backend returned {status}")));
        }

        let body: Value = resp.error_for_status()?.json().await?;
        let content = extract_content(&body)?;

        tracing::debug!(
            model = %self.model,
            content_length = content.len(),
            "Chat completion received"
        );

        Ok(content)
    }
}
