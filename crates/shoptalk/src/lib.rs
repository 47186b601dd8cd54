pub mod analysis;
pub mod cache;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod intent;
pub mod llm;
pub mod query;

// Re-export primary types for convenience
pub use config::EngineConfig;
pub use engine::{AnalyticsEngine, ChatOutcome, UploadOutcome};
pub use error::EngineError;
pub use extraction::{DocumentAnalysisResult, DocumentExtractor, ExtractedLineItem};
pub use intent::{Intent, IntentCategory, IntentClassifier};
pub use query::{AnalyticsStore, QueryExecutor};

pub use anyhow::Result;
pub use uuid::Uuid;
