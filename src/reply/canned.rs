//! Canned reply table.

use super::{ReplyError, ReplyGenerator};

/// Placeholder replaced by the question in the fallback template.
pub const QUESTION_PLACEHOLDER: &str = "{question}";

const GREETING: &str =
    "你好呀！😊 很高兴能为你解答问题，无论你有什么疑问，我都会尽力为你提供帮助。";
const MULTI_TURN: &str = "多轮对话的核心是保留上下文哦！比如你现在问了这个问题，接下来可以继续追问相关内容，我会记得我们之前的对话。";
const STREAMING: &str = "流式输出就是把回复内容逐字、逐句地返回给前端，而不是一次性返回所有内容，这样能提升用户的交互体验。";
const FALLBACK: &str = "你问的问题是：「{question}」。这是一个模拟的流式回复，我会逐字展示这段内容，以此来演示流式输出的效果。";

/// Replies from a fixed table of trigger substrings.
///
/// Rules are checked in insertion order and the first trigger contained in
/// the question wins. Questions matching no rule get the fallback template
/// with the question embedded verbatim.
#[derive(Debug, Clone)]
pub struct CannedReplies {
    rules: Vec<(String, String)>,
    fallback: String,
}

impl Default for CannedReplies {
    fn default() -> Self {
        Self::new(FALLBACK)
            .with_rule("你好", GREETING)
            .with_rule("多轮对话", MULTI_TURN)
            .with_rule("流式输出", STREAMING)
    }
}

impl CannedReplies {
    /// Create an empty table with the given fallback template.
    #[must_use]
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.into(),
        }
    }

    /// Add a rule, checked after the ones already present.
    #[must_use]
    pub fn with_rule(mut self, trigger: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((trigger.into(), reply.into()));
        self
    }

    /// Look up the reply for a question.
    #[must_use]
    pub fn reply_for(&self, question: &str) -> String {
        self.rules
            .iter()
            .find(|(trigger, _)| question.contains(trigger.as_str()))
            .map_or_else(
                || self.fallback.replace(QUESTION_PLACEHOLDER, question),
                |(_, reply)| reply.clone(),
            )
    }
}

#[async_trait::async_trait]
impl ReplyGenerator for CannedReplies {
    async fn generate(&self, question: &str) -> Result<String, ReplyError> {
        Ok(self.reply_for(question))
    }
}
