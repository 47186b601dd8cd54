//! Session lifecycle and reply generation.
//!
//! Sessions live in a sliding-expiry map: every access re-arms a
//! 30-minute idle window, and a session that stays quiet past it is
//! simply gone on the next lookup. History is append-only for the life
//! of the session.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{AttachedDocument, ConversationSession, DocumentStatus, Turn, TurnRole};
use crate::cache::{ExpiringMap, ExpiryPolicy};
use crate::config::ConversationConfig;
use crate::error::EngineError;
use crate::extraction::DocumentAnalysisResult;
use crate::llm::{ChatMessage, CompletionService, GenerationConfig};

const ASSISTANT_INSTRUCTIONS: &str = "You are a helpful assistant for a shop-management system. \
    Answer from the supplied context only; be concise and concrete. \
    When analytics results are provided, summarize the numbers that answer the question. \
    When a document is awaiting confirmation, ask the user to confirm or edit the extracted items.";

pub struct ConversationManager {
    sessions: ExpiringMap<String, ConversationSession>,
    service: Arc<dyn CompletionService>,
    config: ConversationConfig,
}

impl ConversationManager {
    pub fn new(service: Arc<dyn CompletionService>, config: ConversationConfig) -> Self {
        let idle = Duration::from_secs(config.idle_timeout_secs);
        Self::with_idle_timeout(service, idle, config)
    }

    fn with_idle_timeout(
        service: Arc<dyn CompletionService>,
        idle: Duration,
        config: ConversationConfig,
    ) -> Self {
        ConversationManager {
            sessions: ExpiringMap::new(ExpiryPolicy::SlidingIdle(idle)),
            service,
            config,
        }
    }

    /// Fetch the session, creating an empty one if none exists (or the
    /// previous one idled out). The read itself re-arms the idle window.
    pub fn get_or_create(&self, session_id: &str) -> ConversationSession {
        if let Some(session) = self.sessions.get(&session_id.to_string()) {
            return session;
        }
        tracing::debug!(session = %session_id, "creating conversation session");
        let session = ConversationSession::default();
        self.sessions.insert(session_id.to_string(), session.clone());
        session
    }

    pub fn record_user_turn(&self, session_id: &str, content: &str) {
        self.get_or_create(session_id);
        self.sessions.update(&session_id.to_string(), |session| {
            session.history.push(Turn::user(content));
        });
    }

    /// Attach a document analysis to the session. Reply generation reads
    /// the status to decide tone and next actions.
    pub fn attach_document(
        &self,
        session_id: &str,
        analysis: Option<DocumentAnalysisResult>,
        status: DocumentStatus,
    ) {
        self.get_or_create(session_id);
        self.sessions.update(&session_id.to_string(), |session| {
            session.current_document = Some(AttachedDocument {
                status,
                analysis,
                attached_at: chrono::Utc::now(),
            });
            session.pending_actions = actions_for_status(status);
        });
    }

    /// Generate the assistant's reply for the latest user turn, folding
    /// in optional analytics data. The completion call races the
    /// response timeout; elapsing degrades to a canned retry reply
    /// rather than a hard failure.
    pub async fn generate_reply(
        &self,
        session_id: &str,
        data: Option<&Value>,
    ) -> Result<Turn, EngineError> {
        let session = self.get_or_create(session_id);
        let messages = self.build_context(&session, data);

        let turn = match self.complete_with_timeout(&messages).await {
            Ok(content) => {
                let actions = session
                    .current_document
                    .as_ref()
                    .map(|doc| actions_for_status(doc.status))
                    .unwrap_or_default();
                Turn::assistant(content, actions)
            }
            Err(EngineError::ResponseTimeout { seconds }) => {
                tracing::warn!(session = %session_id, seconds, "reply generation timed out");
                Turn::assistant(
                    "Sorry, that took longer than expected. Please ask again in a moment.",
                    vec!["retry".to_string()],
                )
            }
            Err(e) => return Err(e),
        };

        self.sessions.update(&session_id.to_string(), |session| {
            session.history.push(turn.clone());
        });
        Ok(turn)
    }

    /// Bounded context: instructions, document state, pending actions,
    /// and at most the N most recent turns.
    fn build_context(&self, session: &ConversationSession, data: Option<&Value>) -> Vec<ChatMessage> {
        let mut system = String::from(ASSISTANT_INSTRUCTIONS);

        if let Some(doc) = &session.current_document {
            system.push_str(&format!("\nCurrent document status: {}.", doc.status.as_str()));
            if let Some(analysis) = &doc.analysis {
                system.push_str(&format!(
                    " Extracted {} line item(s) from '{}' at {:.0}% confidence.",
                    analysis.items.len(),
                    analysis.metadata.filename,
                    analysis.metadata.aggregate_confidence * 100.0
                ));
            }
        }
        if !session.pending_actions.is_empty() {
            system.push_str(&format!("\nPending actions: {}.", session.pending_actions.join(", ")));
        }
        if let Some(data) = data {
            system.push_str(&format!("\nAnalytics results:\n{data}"));
        }

        let mut messages = vec![ChatMessage::system(system)];
        let skip = session.history.len().saturating_sub(self.config.context_turns);
        messages.extend(session.history[skip..].iter().map(|turn| match turn.role {
            TurnRole::User => ChatMessage::user(&turn.content),
            TurnRole::Assistant => ChatMessage::assistant(&turn.content),
        }));
        messages
    }

    async fn complete_with_timeout(&self, messages: &[ChatMessage]) -> Result<String, EngineError> {
        let budget = Duration::from_secs(self.config.response_timeout_secs);
        match tokio::time::timeout(
            budget,
            self.service.complete(messages, &GenerationConfig::default()),
        )
        .await
        {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(EngineError::Completion(e.to_string())),
            Err(_) => Err(EngineError::ResponseTimeout {
                seconds: self.config.response_timeout_secs,
            }),
        }
    }

    /// Drop idled-out sessions eagerly. Lookups self-clean either way.
    pub fn sweep_sessions(&self) -> usize {
        self.sessions.sweep()
    }
}

pub(crate) fn actions_for_status(status: DocumentStatus) -> Vec<String> {
    let actions: &[&str] = match status {
        DocumentStatus::PendingConfirmation => &["confirm", "edit", "cancel"],
        DocumentStatus::NeedsReview => &["review", "edit", "cancel"],
        DocumentStatus::Error => &["retry_upload"],
    };
    actions.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct EchoService {
        last_messages: Mutex<Vec<ChatMessage>>,
    }

    impl EchoService {
        fn new() -> Self {
            EchoService {
                last_messages: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionService for EchoService {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _config: &GenerationConfig,
        ) -> anyhow::Result<String> {
            *self.last_messages.lock() = messages.to_vec();
            Ok("Here is your answer.".to_string())
        }
    }

    struct StallingService;

    #[async_trait]
    impl CompletionService for StallingService {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _config: &GenerationConfig,
        ) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(String::new())
        }
    }

    fn config() -> ConversationConfig {
        ConversationConfig {
            idle_timeout_secs: 1800,
            response_timeout_secs: 30,
            context_turns: 3,
        }
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let manager = ConversationManager::new(Arc::new(EchoService::new()), config());
        manager.record_user_turn("alice", "hello");
        let session = manager.get_or_create("alice");
        assert_eq!(session.history.len(), 1);
    }

    #[test]
    fn test_idle_session_expires() {
        let manager = ConversationManager::with_idle_timeout(
            Arc::new(EchoService::new()),
            Duration::from_millis(40),
            config(),
        );
        manager.record_user_turn("bob", "hello");
        std::thread::sleep(Duration::from_millis(60));
        let session = manager.get_or_create("bob");
        assert!(session.history.is_empty());
    }

    #[test]
    fn test_access_rearms_idle_window() {
        let manager = ConversationManager::with_idle_timeout(
            Arc::new(EchoService::new()),
            Duration::from_millis(80),
            config(),
        );
        manager.record_user_turn("carol", "hello");
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(40));
            manager.get_or_create("carol");
        }
        let session = manager.get_or_create("carol");
        assert_eq!(session.history.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_appends_assistant_turn() {
        let manager = ConversationManager::new(Arc::new(EchoService::new()), config());
        manager.record_user_turn("dave", "how are sales?");
        let turn = manager.generate_reply("dave", None).await.unwrap();
        assert_eq!(turn.role, TurnRole::Assistant);
        let session = manager.get_or_create("dave");
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[1].content, "Here is your answer.");
    }

    #[tokio::test]
    async fn test_context_is_bounded_to_recent_turns() {
        let service = Arc::new(EchoService::new());
        let manager = ConversationManager::new(service.clone(), config());
        for i in 0..6 {
            manager.record_user_turn("erin", &format!("message {i}"));
        }
        manager.generate_reply("erin", None).await.unwrap();
        let messages = service.last_messages.lock().clone();
        // system message + 3 most recent turns
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].content, "message 5");
    }

    #[tokio::test]
    async fn test_document_status_reaches_the_prompt() {
        let service = Arc::new(EchoService::new());
        let manager = ConversationManager::new(service.clone(), config());
        manager.attach_document("frank", None, DocumentStatus::NeedsReview);
        manager.record_user_turn("frank", "what did you find?");
        let turn = manager.generate_reply("frank", None).await.unwrap();
        let messages = service.last_messages.lock().clone();
        assert!(messages[0].content.contains("needs_review"));
        assert_eq!(turn.suggested_actions, vec!["review", "edit", "cancel"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_to_retry_reply() {
        let manager = ConversationManager::new(Arc::new(StallingService), config());
        manager.record_user_turn("grace", "hello?");
        let turn = manager.generate_reply("grace", None).await.unwrap();
        assert_eq!(turn.suggested_actions, vec!["retry"]);
        // The canned reply still lands in history
        let session = manager.get_or_create("grace");
        assert_eq!(session.history.len(), 2);
    }

    #[tokio::test]
    async fn test_analytics_data_reaches_the_prompt() {
        let service = Arc::new(EchoService::new());
        let manager = ConversationManager::new(service.clone(), config());
        manager.record_user_turn("hana", "revenue this week?");
        let data = serde_json::json!({"revenue": {"rows": [{"revenue": 1250.0}]}});
        manager.generate_reply("hana", Some(&data)).await.unwrap();
        let messages = service.last_messages.lock().clone();
        assert!(messages[0].content.contains("1250"));
    }
}
