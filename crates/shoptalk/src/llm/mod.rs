//! Completion-service boundary.
//!
//! The engine needs exactly one external language-model capability: take a
//! role-tagged message list plus a system instruction and return one text
//! completion. Everything behind that call (provider, model, retries) lives
//! on the other side of the `CompletionService` trait.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiCompatProvider;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.3,
            top_p: 0.9,
        }
    }
}

impl GenerationConfig {
    /// Short-form profile for classification calls: low temperature, small cap.
    pub fn classification() -> Self {
        Self {
            max_tokens: 400,
            temperature: 0.0,
            top_p: 1.0,
        }
    }
}

/// One external text-completion call. Implementations must be safe to share
/// across concurrent tasks.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<String>;
}

/// Quick token estimate (chars / 4).
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}
