//! Conversation sessions and reply generation.

pub mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use manager::ConversationManager;

use crate::extraction::DocumentAnalysisResult;

// ============================================================================
// Turns
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            suggested_actions: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, suggested_actions: Vec<String>) -> Self {
        Turn {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            suggested_actions,
        }
    }
}

// ============================================================================
// Attached documents
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Extraction looked clean; waiting for the user to confirm the items.
    PendingConfirmation,
    /// Extraction succeeded but something needs a human eye first.
    NeedsReview,
    /// Processing failed; reply generation should apologize and suggest
    /// a re-upload.
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::PendingConfirmation => "pending_confirmation",
            DocumentStatus::NeedsReview => "needs_review",
            DocumentStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDocument {
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<DocumentAnalysisResult>,
    pub attached_at: DateTime<Utc>,
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub history: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_document: Option<AttachedDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_actions: Vec<String>,
}
