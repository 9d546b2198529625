//! Adapter interfaces for external systems.
//!
//! The pipeline talks to one external collaborator directly: a
//! text-completion service. Everything it needs from that service goes
//! through the `CompletionService` trait.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiAdapter;

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single completion request
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Model selector
    pub model: String,

    /// Ordered role/content messages
    pub messages: Vec<ChatMessage>,

    /// Maximum output tokens
    pub max_tokens: u32,

    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            max_tokens,
            temperature,
        }
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    /// Content of the first system message, if any
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Content of the last user message, if any
    pub fn user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Output from a completion call
#[derive(Debug, Clone)]
pub struct CompletionOutput {
    /// Free text returned by the model
    pub content: String,

    /// Tokens used (if available)
    pub tokens_used: Option<u64>,
}

impl CompletionOutput {
    /// Create a new output with just content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens_used: None,
        }
    }
}

/// Trait for text-completion backends
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Run one completion. Implementations bound the call with their own timeout.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionOutput>;

    /// Health check
    async fn health_check(&self) -> Result<()>;
}
