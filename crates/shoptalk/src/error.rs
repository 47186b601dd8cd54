//! Engine error taxonomy.
//!
//! Every service-boundary failure maps to a stable error code so the HTTP
//! layer can key canned explanations off it without inspecting messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The extraction engine (OCR or PDF text layer) failed outright.
    #[error("document processing failed: {0}")]
    DocumentProcessing(String),

    /// Every extraction strategy ran and nothing cleared the confidence bar.
    #[error("no line items found above the confidence threshold")]
    NoItemsFound,

    /// Malformed request: bad MIME type, oversized file, out-of-range parameter.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A single analytical query exceeded the hard execution deadline.
    /// Distinct from `QueryFailed` so callers can suggest narrowing the range.
    #[error("query for metric '{metric}' timed out after {seconds}s")]
    QueryTimeout { metric: String, seconds: u64 },

    /// Data or connection error from the analytics store.
    #[error("query for metric '{metric}' failed: {source}")]
    QueryFailed {
        metric: String,
        #[source]
        source: anyhow::Error,
    },

    /// No template registered for a (category, metric) pair.
    #[error("no query template for {category}/{metric}")]
    UnknownMetric { category: String, metric: String },

    /// The completion service errored or returned unparseable output.
    /// Classification callers degrade to the default intent instead of
    /// surfacing this.
    #[error("completion service failed: {0}")]
    Completion(String),

    /// Reply generation lost the race against the response deadline.
    #[error("response generation timed out after {seconds}s")]
    ResponseTimeout { seconds: u64 },
}

impl EngineError {
    /// Stable machine-readable code for the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::DocumentProcessing(_) => "DOCUMENT_PROCESSING_ERROR",
            EngineError::NoItemsFound => "NO_ITEMS_FOUND",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::QueryTimeout { .. } => "QUERY_TIMEOUT",
            EngineError::QueryFailed { .. } => "QUERY_FAILED",
            EngineError::UnknownMetric { .. } => "UNKNOWN_METRIC",
            EngineError::Completion(_) => "COMPLETION_FAILED",
            EngineError::ResponseTimeout { .. } => "RESPONSE_TIMEOUT",
        }
    }
}
