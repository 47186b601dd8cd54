//! Engine facade.
//!
//! Wires the extractor, purchase-order analyzer, classifier, executor
//! and conversation manager behind the two operations the transport
//! layer calls: document upload and chat.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::{DeclaredTotals, ProductCatalog, PurchaseOrderAnalysis, PurchaseOrderAnalyzer};
use crate::config::EngineConfig;
use crate::conversation::manager::actions_for_status;
use crate::conversation::{ConversationManager, DocumentStatus, TurnRole};
use crate::error::EngineError;
use crate::extraction::{DocumentAnalysisResult, DocumentExtractor};
use crate::extraction::ocr::TextRecognizer;
use crate::intent::{IntentCategory, IntentClassifier};
use crate::llm::{ChatMessage, CompletionService};
use crate::query::{AnalyticsStore, QueryExecutor};

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub success: bool,
    pub analysis: DocumentAnalysisResult,
    pub message: String,
    pub next_steps: Vec<String>,
    pub suggested_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub suggestions: Vec<String>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct AnalyticsEngine {
    config: EngineConfig,
    extractor: DocumentExtractor,
    analyzer: PurchaseOrderAnalyzer,
    classifier: IntentClassifier,
    executor: QueryExecutor,
    conversations: ConversationManager,
}

impl AnalyticsEngine {
    pub fn new(
        config: EngineConfig,
        service: Arc<dyn CompletionService>,
        recognizer: Arc<dyn TextRecognizer>,
        catalog: Arc<dyn ProductCatalog>,
        store: Arc<dyn AnalyticsStore>,
    ) -> Self {
        let classifier = IntentClassifier::new(
            service.clone(),
            Duration::from_secs(config.classifier.cache_ttl_secs),
            config.classifier.history_turns,
        );
        AnalyticsEngine {
            extractor: DocumentExtractor::new(recognizer, config.extraction.clone()),
            analyzer: PurchaseOrderAnalyzer::new(catalog, config.finance.clone()),
            classifier,
            executor: QueryExecutor::new(store, config.query.clone()),
            conversations: ConversationManager::new(service, config.conversation.clone()),
            config,
        }
    }

    // ------------------------------------------------------------------
    // Document upload
    // ------------------------------------------------------------------

    /// Validate, extract and attach an uploaded document to the session.
    /// A failed extraction still marks the session's document as errored
    /// so the next reply can suggest a re-upload.
    pub async fn handle_upload(
        &self,
        session_id: &str,
        filename: &str,
        mime_type: &str,
        buffer: &[u8],
    ) -> Result<UploadOutcome, EngineError> {
        if buffer.len() > self.config.extraction.max_file_size_bytes {
            return Err(EngineError::Validation(format!(
                "file '{filename}' exceeds the {} byte limit",
                self.config.extraction.max_file_size_bytes
            )));
        }
        if !self
            .config
            .extraction
            .allowed_mime_types
            .iter()
            .any(|allowed| allowed == mime_type)
        {
            return Err(EngineError::Validation(format!(
                "unsupported file type '{mime_type}'"
            )));
        }

        let analysis = match self.extractor.analyze(buffer, mime_type, filename).await {
            Ok(analysis) => analysis,
            Err(e) => {
                self.conversations
                    .attach_document(session_id, None, DocumentStatus::Error);
                return Err(e);
            }
        };

        let status = if analysis.items.iter().any(|item| item.possible_duplicate) {
            DocumentStatus::NeedsReview
        } else {
            DocumentStatus::PendingConfirmation
        };
        self.conversations
            .attach_document(session_id, Some(analysis.clone()), status);

        tracing::info!(
            session = %session_id,
            filename = %filename,
            items = analysis.items.len(),
            confidence = analysis.metadata.aggregate_confidence,
            status = %status.as_str(),
            "document processed"
        );

        let message = match status {
            DocumentStatus::PendingConfirmation => format!(
                "Found {} line item(s) in '{}'. Confirm to add them to a purchase order.",
                analysis.items.len(),
                filename
            ),
            _ => format!(
                "Found {} line item(s) in '{}', but some need a closer look before confirming.",
                analysis.items.len(),
                filename
            ),
        };

        Ok(UploadOutcome {
            success: true,
            analysis,
            message,
            next_steps: vec![
                "Review the extracted items".to_string(),
                "Confirm or edit before creating the order".to_string(),
            ],
            suggested_actions: actions_for_status(status),
        })
    }

    /// Reconcile the session's attached document against vendor-declared
    /// totals and produce catalog matches, warranty suggestions and the
    /// confirm/edit/cancel decision.
    pub async fn analyze_purchase_order(
        &self,
        session_id: &str,
        declared: &DeclaredTotals,
    ) -> Result<PurchaseOrderAnalysis, EngineError> {
        let session = self.conversations.get_or_create(session_id);
        let analysis = session
            .current_document
            .and_then(|doc| doc.analysis)
            .ok_or_else(|| {
                EngineError::Validation("no document attached to this session".to_string())
            })?;

        self.analyzer
            .analyze(&analysis.items, declared)
            .await
            .map_err(|e| EngineError::DocumentProcessing(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    /// Classify the message, run analytics for non-general intents, and
    /// fold the results into the session reply.
    pub async fn handle_message(
        &self,
        session_id: &str,
        organization_id: i64,
        message: &str,
    ) -> Result<ChatOutcome, EngineError> {
        let history = self.chat_history(session_id);
        self.conversations.record_user_turn(session_id, message);

        let intent = self.classifier.classify(message, &history).await;

        let data = if intent.category != IntentCategory::General && !intent.metrics.is_empty() {
            let results = self
                .executor
                .execute_aggregated(organization_id, intent.category, &intent.metrics, &intent.parameters)
                .await;
            Some(serde_json::to_value(results).map_err(|e| {
                EngineError::DocumentProcessing(format!("result serialization failed: {e}"))
            })?)
        } else {
            None
        };

        let reply = self.conversations.generate_reply(session_id, data.as_ref()).await?;

        Ok(ChatOutcome {
            success: true,
            message: reply.content,
            data,
            suggestions: reply.suggested_actions,
        })
    }

    /// Drop expired cache entries and idle sessions. Lookups self-clean
    /// lazily; hosts may call this from a periodic task.
    pub fn sweep(&self) -> usize {
        self.classifier.sweep_cache() + self.conversations.sweep_sessions()
    }

    fn chat_history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.conversations
            .get_or_create(session_id)
            .history
            .iter()
            .map(|turn| match turn.role {
                TurnRole::User => ChatMessage::user(&turn.content),
                TurnRole::Assistant => ChatMessage::assistant(&turn.content),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;

    use crate::analysis::CatalogProduct;
    use crate::llm::GenerationConfig;
    use crate::query::Row;

    /// Serves both the classifier and the chat reply: classification
    /// prompts are recognizable by their JSON-only instruction.
    struct DualRoleService;

    #[async_trait]
    impl CompletionService for DualRoleService {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _config: &GenerationConfig,
        ) -> anyhow::Result<String> {
            let system = &messages[0].content;
            if system.contains("Output ONLY the JSON object") {
                Ok(r#"{"category":"INVENTORY","intent":"check_stock","metrics":["stock_levels"]}"#
                    .to_string())
            } else {
                Ok("You have 12 products in stock; 2 are below their reorder point.".to_string())
            }
        }
    }

    struct NullRecognizer;

    #[async_trait]
    impl TextRecognizer for NullRecognizer {
        async fn recognize(&self, _image: &[u8], _mime_type: &str) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    struct EmptyCatalog;

    #[async_trait]
    impl ProductCatalog for EmptyCatalog {
        async fn find_by_sku(&self, _sku: &str) -> anyhow::Result<Option<CatalogProduct>> {
            Ok(None)
        }
        async fn find_by_name(&self, _name: &str) -> anyhow::Result<Option<CatalogProduct>> {
            Ok(None)
        }
        async fn find_similar(
            &self,
            _manufacturer: &str,
            _category: &str,
            _warranty_tag: &str,
            _limit: usize,
        ) -> anyhow::Result<Vec<CatalogProduct>> {
            Ok(Vec::new())
        }
    }

    struct CannedStore;

    #[async_trait]
    impl AnalyticsStore for CannedStore {
        async fn fetch(&self, _sql: &str, _params: &HashMap<String, Value>) -> anyhow::Result<Vec<Row>> {
            Ok(vec![HashMap::from([
                ("sku".to_string(), serde_json::json!("BAT-A123")),
                ("quantity_on_hand".to_string(), serde_json::json!(12)),
            ])])
        }
    }

    fn engine() -> AnalyticsEngine {
        AnalyticsEngine::new(
            EngineConfig::default(),
            Arc::new(DualRoleService),
            Arc::new(NullRecognizer),
            Arc::new(EmptyCatalog),
            Arc::new(CannedStore),
        )
    }

    #[tokio::test]
    async fn test_stock_question_end_to_end() {
        let engine = engine();
        let outcome = engine
            .handle_message("alice", 42, "what's my current stock level")
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.message.contains("stock"));
        // stock_levels enriches low_stock, so the batch carries both
        let data = outcome.data.unwrap();
        assert!(data.get("stock_levels").is_some());
        assert!(data.get("low_stock").is_some());
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let engine = engine();
        let config = EngineConfig::default();
        let buffer = vec![0u8; config.extraction.max_file_size_bytes + 1];
        let err = engine
            .handle_upload("alice", "big.pdf", "application/pdf", &buffer)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_disallowed_mime_rejected() {
        let engine = engine();
        let err = engine
            .handle_upload("alice", "sheet.xlsx", "application/vnd.ms-excel", b"PK")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_blank_image_marks_document_errored() {
        let engine = engine();
        let err = engine
            .handle_upload("bob", "photo.png", "image/png", &[0u8; 16])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NO_ITEMS_FOUND");

        // The errored status must reach the session for the next reply
        let session = engine.conversations.get_or_create("bob");
        let doc = session.current_document.unwrap();
        assert_eq!(doc.status, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn test_purchase_order_analysis_requires_a_document() {
        let engine = engine();
        let declared = DeclaredTotals {
            subtotal: 100.0,
            tax: 6.0,
            total: 106.0,
            shipping_fee: 0.0,
        };
        let err = engine
            .analyze_purchase_order("carol", &declared)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
