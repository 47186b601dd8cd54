//! LLM-backed intent classifier.
//!
//! One completion call handles classification and parameter extraction;
//! every model answer is validated against the static taxonomy before it
//! is trusted, and anything unparseable degrades to a safe GENERAL
//! intent rather than an error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::taxonomy;
use super::{Intent, IntentCategory, IntentContext, IntentParameters};
use crate::cache::{ExpiringMap, ExpiryPolicy};
use crate::llm::{ChatMessage, CompletionService, GenerationConfig};

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

const CLASSIFIER_INSTRUCTIONS: &str = r#"You classify questions about a shop-management system. Output a JSON object with exactly these fields:

{"category":"<CATEGORY>","intent":"<short_snake_case_label>","metrics":["..."],"parameters":{"timeRange":"today|week|month|quarter|year","specificItem":"...","organizationId":123,"serialNumber":"...","vendorId":456,"orderStatus":"...","aggregation":"daily|weekly|monthly"},"context":{"requiresHistoricalData":false,"needsComparison":false}}

Categories and their metrics:
"#;

fn build_system_instruction() -> String {
    format!(
        "{}{}\nRULES:\n\
         - Pick exactly one category. Questions outside the shop domain are GENERAL with intent \"unknown\" and no metrics.\n\
         - metrics may only contain names listed under the chosen category.\n\
         - Omit any parameter the question does not state. Never invent IDs.\n\
         - \"running low\", \"out of stock\" = INVENTORY with low_stock.\n\
         - \"how much did we sell\", \"revenue\" = SALES with revenue.\n\
         Output ONLY the JSON object, nothing else.",
        CLASSIFIER_INSTRUCTIONS,
        taxonomy::prompt_catalog()
    )
}

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

/// Raw model output before validation. Category arrives as a free string
/// so a creative spelling degrades gracefully instead of failing serde.
#[derive(Debug, Deserialize)]
struct RawIntent {
    category: String,
    #[serde(default)]
    intent: String,
    #[serde(default)]
    metrics: Vec<String>,
    #[serde(default)]
    parameters: IntentParameters,
    #[serde(default)]
    context: IntentContext,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct IntentClassifier {
    service: Arc<dyn CompletionService>,
    cache: ExpiringMap<String, Intent>,
    history_turns: usize,
}

impl IntentClassifier {
    pub fn new(service: Arc<dyn CompletionService>, cache_ttl: Duration, history_turns: usize) -> Self {
        IntentClassifier {
            service,
            cache: ExpiringMap::new(ExpiryPolicy::FixedTtl(cache_ttl)),
            history_turns,
        }
    }

    /// Classify a message. Never fails: any model or parse problem
    /// produces the GENERAL fallback intent.
    pub async fn classify(&self, message: &str, history: &[ChatMessage]) -> Intent {
        let cache_key = normalize_for_cache(message);

        if let Some(cached) = self.cache.get(&cache_key) {
            tracing::debug!(key = %cache_key, "intent cache hit");
            return cached;
        }

        // Only successful classifications are cached: a fallback from a
        // transient provider error must not pin GENERAL for the full TTL.
        match self.classify_uncached(message, history).await {
            Ok(intent) => {
                tracing::info!(
                    category = %intent.category.as_str(),
                    intent = %intent.intent,
                    metrics = ?intent.metrics,
                    "classified intent"
                );
                self.cache.insert(cache_key, intent.clone());
                intent
            }
            Err(e) => {
                tracing::warn!(error = %e, "intent classification failed, using fallback");
                Intent::fallback()
            }
        }
    }

    async fn classify_uncached(&self, message: &str, history: &[ChatMessage]) -> anyhow::Result<Intent> {
        let mut messages = vec![ChatMessage::system(build_system_instruction())];
        let skip = history.len().saturating_sub(self.history_turns);
        messages.extend(history[skip..].iter().cloned());
        messages.push(ChatMessage::user(message));

        let raw = self
            .service
            .complete(&messages, &GenerationConfig::classification())
            .await?;

        let parsed = parse_intent_response(&raw)?;
        Ok(validate_and_enrich(parsed))
    }

    /// Drop expired cache entries. Callers may run this periodically; the
    /// cache self-cleans on read either way.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep()
    }
}

/// Cache key: lowercase, trimmed, internal whitespace collapsed.
fn normalize_for_cache(message: &str) -> String {
    message.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parse the model's JSON answer. Handles markdown fences and trailing
/// chatter; a strict serde parse is tried first, then a lenient field
/// scan. A response without a recognizable category is an error, so the
/// caller can fall back without polluting the cache.
fn parse_intent_response(raw: &str) -> anyhow::Result<Intent> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    // Strict parse first
    if let Ok(raw_intent) = serde_json::from_str::<RawIntent>(json_str) {
        if let Some(category) = IntentCategory::from_loose(&raw_intent.category) {
            return Ok(Intent {
                category,
                intent: raw_intent.intent,
                metrics: raw_intent.metrics,
                parameters: raw_intent.parameters,
                context: raw_intent.context,
            });
        }
    }

    // Lenient parse: pull the recognizable fields out by hand
    let category = extract_json_string(json_str, "category")
        .and_then(|s| IntentCategory::from_loose(&s))
        .ok_or_else(|| anyhow::anyhow!("no recognizable category in completion output"))?;

    let intent = extract_json_string(json_str, "intent").unwrap_or_else(|| "unknown".to_string());
    let metrics = extract_json_array(json_str, "metrics").unwrap_or_default();

    let mut parameters = IntentParameters::default();
    parameters.time_range = extract_json_string(json_str, "timeRange");
    parameters.specific_item = extract_json_string(json_str, "specificItem");
    parameters.serial_number = extract_json_string(json_str, "serialNumber");
    parameters.order_status = extract_json_string(json_str, "orderStatus");
    parameters.aggregation = extract_json_string(json_str, "aggregation");

    Ok(Intent {
        category,
        intent,
        metrics,
        parameters,
        context: IntentContext::default(),
    })
}

/// Extract a JSON string field value by scanning for `"field":"value"`.
fn extract_json_string(json: &str, field: &str) -> Option<String> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?;
    let trimmed = after_colon.trim_start();

    if !trimmed.starts_with('"') {
        return None;
    }

    let content = &trimmed[1..];
    let mut end = 0;
    let mut escaped = false;
    for (i, ch) in content.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            end = i;
            break;
        }
    }

    if end > 0 {
        Some(content[..end].to_string())
    } else {
        None
    }
}

/// Extract a JSON string array field by scanning for `"field":["v1","v2"]`.
fn extract_json_array(json: &str, field: &str) -> Option<Vec<String>> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();

    if !after_colon.starts_with('[') {
        return None;
    }

    let bracket_end = after_colon.find(']')?;
    let arr_str = &after_colon[1..bracket_end];

    let items: Vec<String> = arr_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim().trim_matches('"');
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect();

    Some(items)
}

// ---------------------------------------------------------------------------
// Validation and enrichment
// ---------------------------------------------------------------------------

/// Keep only metrics the taxonomy declares for the chosen category, then
/// apply the deterministic enrichment rules.
fn validate_and_enrich(mut intent: Intent) -> Intent {
    let allowed = taxonomy::allowed_metrics(intent.category);

    let mut seen: HashSet<String> = HashSet::new();
    intent.metrics.retain(|m| allowed.contains(m.as_str()) && seen.insert(m.clone()));

    let mut push_metric = |metrics: &mut Vec<String>, name: &str| {
        if allowed.contains(name) && !metrics.iter().any(|m| m == name) {
            metrics.push(name.to_string());
        }
    };

    if intent.metrics.iter().any(|m| m == "stock_levels") {
        push_metric(&mut intent.metrics, "low_stock");
        intent.context.stock_alert = true;
    }

    if intent.metrics.iter().any(|m| m == "product_movement") {
        intent.context.requires_historical_data = true;
    }

    if intent.parameters.organization_id.is_some() {
        intent.parameters.hierarchy_scope = Some("organization".to_string());
        push_metric(&mut intent.metrics, "org_structure");
    }

    if intent.parameters.serial_number.is_some() {
        intent.parameters.unit_level_detail = true;
        push_metric(&mut intent.metrics, "unit_tracking");
    }

    if intent.parameters.specific_item.is_some() && intent.category == IntentCategory::Inventory {
        push_metric(&mut intent.metrics, "alias_matching");
        intent.parameters.confidence_threshold.get_or_insert(0.8);
    }

    intent
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    struct ScriptedService {
        response: String,
        calls: AtomicUsize,
    }

    impl ScriptedService {
        fn new(response: &str) -> Self {
            ScriptedService {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedService {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _config: &GenerationConfig,
        ) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn classifier_for(response: &str) -> (IntentClassifier, Arc<ScriptedService>) {
        let service = Arc::new(ScriptedService::new(response));
        let classifier =
            IntentClassifier::new(service.clone(), Duration::from_secs(300), 3);
        (classifier, service)
    }

    #[tokio::test]
    async fn test_well_formed_response() {
        let (classifier, _) = classifier_for(
            r#"{"category":"SALES","intent":"check_revenue","metrics":["revenue"],"parameters":{"timeRange":"month"},"context":{"requiresHistoricalData":true}}"#,
        );
        let intent = classifier.classify("how much revenue this month", &[]).await;
        assert_eq!(intent.category, IntentCategory::Sales);
        assert_eq!(intent.intent, "check_revenue");
        assert_eq!(intent.metrics, vec!["revenue"]);
        assert_eq!(intent.parameters.time_range.as_deref(), Some("month"));
        assert!(intent.context.requires_historical_data);
    }

    #[tokio::test]
    async fn test_fenced_response_is_accepted() {
        let (classifier, _) = classifier_for(
            "```json\n{\"category\":\"INVENTORY\",\"intent\":\"check_stock\",\"metrics\":[\"stock_levels\"]}\n```",
        );
        let intent = classifier.classify("what's my stock", &[]).await;
        assert_eq!(intent.category, IntentCategory::Inventory);
        assert!(intent.metrics.contains(&"stock_levels".to_string()));
    }

    #[tokio::test]
    async fn test_garbage_falls_back_to_general() {
        let (classifier, _) = classifier_for("I'm sorry, I cannot help with that.");
        let intent = classifier.classify("tell me a joke", &[]).await;
        assert_eq!(intent.category, IntentCategory::General);
        assert_eq!(intent.intent, "unknown");
        assert!(intent.metrics.is_empty());
        assert_eq!(intent.parameters.time_range.as_deref(), Some("today"));
    }

    #[tokio::test]
    async fn test_unknown_metrics_are_filtered() {
        let (classifier, _) = classifier_for(
            r#"{"category":"SALES","intent":"check_revenue","metrics":["revenue","stock_levels","revenue"]}"#,
        );
        let intent = classifier.classify("revenue please", &[]).await;
        assert_eq!(intent.metrics, vec!["revenue"]);
    }

    #[tokio::test]
    async fn test_cache_suppresses_repeat_calls() {
        let (classifier, service) = classifier_for(
            r#"{"category":"SALES","intent":"check_revenue","metrics":["revenue"]}"#,
        );
        classifier.classify("Revenue  this month", &[]).await;
        // Same message modulo case and spacing hits the cache
        classifier.classify("revenue this month", &[]).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    /// Errors on the first call, answers normally afterwards.
    struct RecoveringService {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for RecoveringService {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _config: &GenerationConfig,
        ) -> anyhow::Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("provider unavailable");
            }
            Ok(r#"{"category":"SALES","intent":"check_revenue","metrics":["revenue"]}"#.to_string())
        }
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let service = Arc::new(RecoveringService { calls: AtomicUsize::new(0) });
        let classifier =
            IntentClassifier::new(service.clone(), Duration::from_secs(300), 3);

        // First call hits the provider outage and degrades
        let first = classifier.classify("revenue this month", &[]).await;
        assert_eq!(first.category, IntentCategory::General);
        assert_eq!(first.intent, "unknown");

        // Second call must re-classify, not replay the cached fallback
        let second = classifier.classify("revenue this month", &[]).await;
        assert_eq!(second.category, IntentCategory::Sales);
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_garbage_response_is_not_cached() {
        let (classifier, service) = classifier_for("I'm sorry, I cannot help with that.");
        classifier.classify("tell me a joke", &[]).await;
        let intent = classifier.classify("tell me a joke", &[]).await;
        assert_eq!(intent.category, IntentCategory::General);
        // Unparseable output never enters the cache, so both calls reach the service
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_expires() {
        let service = Arc::new(ScriptedService::new(
            r#"{"category":"SALES","intent":"check_revenue","metrics":["revenue"]}"#,
        ));
        let classifier =
            IntentClassifier::new(service.clone(), Duration::from_millis(40), 3);
        classifier.classify("revenue", &[]).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        classifier.classify("revenue", &[]).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stock_levels_enriches_low_stock() {
        let (classifier, _) = classifier_for(
            r#"{"category":"INVENTORY","intent":"check_stock","metrics":["stock_levels"]}"#,
        );
        let intent = classifier.classify("current stock levels", &[]).await;
        assert_eq!(intent.metrics, vec!["stock_levels", "low_stock"]);
        assert!(intent.context.stock_alert);
    }

    #[tokio::test]
    async fn test_serial_number_enriches_unit_tracking() {
        let (classifier, _) = classifier_for(
            r#"{"category":"INVENTORY","intent":"trace_unit","metrics":[],"parameters":{"serialNumber":"SN-0042"}}"#,
        );
        let intent = classifier.classify("where is serial SN-0042", &[]).await;
        assert!(intent.parameters.unit_level_detail);
        assert!(intent.metrics.contains(&"unit_tracking".to_string()));
    }

    #[tokio::test]
    async fn test_specific_item_enriches_alias_matching() {
        let (classifier, _) = classifier_for(
            r#"{"category":"INVENTORY","intent":"check_stock","metrics":["stock_levels"],"parameters":{"specificItem":"car battery A123"}}"#,
        );
        let intent = classifier.classify("stock for car battery A123", &[]).await;
        assert!(intent.metrics.contains(&"alias_matching".to_string()));
        assert_eq!(intent.parameters.confidence_threshold, Some(0.8));
    }

    #[tokio::test]
    async fn test_organization_id_enriches_hierarchy() {
        let (classifier, _) = classifier_for(
            r#"{"category":"INVENTORY","intent":"org_stock","metrics":["stock_levels"],"parameters":{"organizationId":7}}"#,
        );
        let intent = classifier.classify("stock for org 7", &[]).await;
        assert_eq!(intent.parameters.hierarchy_scope.as_deref(), Some("organization"));
        assert!(intent.metrics.contains(&"org_structure".to_string()));
    }

    #[test]
    fn test_lenient_parse_recovers_category() {
        let intent = parse_intent_response(
            "Here you go: {\"category\": \"WARRANTIES\", \"intent\": \"expiring\", \"metrics\": [\"expiring_warranties\"], \"parameters\": {\"timeRange\": \"month\", \"extra\": }}",
        )
        .unwrap();
        assert_eq!(intent.category, IntentCategory::Warranties);
        assert_eq!(intent.metrics, vec!["expiring_warranties"]);
        assert_eq!(intent.parameters.time_range.as_deref(), Some("month"));
    }

    #[test]
    fn test_unparseable_response_is_an_error() {
        assert!(parse_intent_response("no json here at all").is_err());
    }

    #[test]
    fn test_normalize_for_cache() {
        assert_eq!(normalize_for_cache("  What's  MY Stock? "), "what's my stock?");
    }
}
