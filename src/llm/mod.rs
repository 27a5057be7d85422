//! LLM client module.
//!
//! Provides a trait-based abstraction over chat-completion providers, with
//! OpenRouter as the primary implementation. The agent contract is
//! deliberately narrow: an ordered message history goes in, free text comes
//! out. No structured output is guaranteed by the provider; turning the text
//! into actions is the session parser's job.

mod error;
mod openrouter;

pub use error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};
pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
        }
    }
}

/// Trait for LLM clients.
///
/// Implementations are responsible for transport-level retry; callers treat a
/// returned error as exhausted.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the full ordered history and obtain the model's next reply.
    async fn converse(&self, model: &str, messages: &[ChatMessage]) -> anyhow::Result<String>;
}
