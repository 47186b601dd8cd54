//! Document extraction: file buffer in, scored candidate line items out.
//!
//! Images go through the OCR boundary, PDFs through the text layer. The raw
//! text is normalized, every extraction strategy runs over it, and surviving
//! candidates are confidence-scored against the shop's catalog conventions.

pub mod ocr;
pub mod strategies;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::LazyLock;

use uuid::Uuid;

use crate::config::ExtractionConfig;
use crate::error::EngineError;

pub use ocr::{HttpOcrClient, OcrOptions, TextRecognizer};
use strategies::{RawLineItem, NAME_SHAPE_RE};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLineItem {
    pub product_name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_total: Option<f64>,
    pub confidence: f64,
    /// Another strategy already yielded an item with the same
    /// (sku, quantity, unit_price) tuple. Flagged, never merged.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub possible_duplicate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub document_id: Uuid,
    pub filename: String,
    pub filesize: usize,
    pub mime_type: String,
    pub aggregate_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysisResult {
    pub items: Vec<ExtractedLineItem>,
    pub metadata: DocumentMetadata,
}

// ============================================================================
// Text preprocessing
// ============================================================================

static THOUSANDS_SEP_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(\d),(\d{3})").expect("thousands sep regex is valid"));
static WHITESPACE_RUN_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[ \t]+").expect("whitespace run regex is valid"));

/// Normalize extracted text before pattern matching: unify line endings,
/// drop non-printables and quotes, collapse whitespace runs, and strip
/// thousands separators embedded in numbers ("17,500" -> "17500").
pub fn preprocess(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let printable: String = unified
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .filter(|c| !matches!(c, '"' | '\'' | '`' | '\u{2018}' | '\u{2019}' | '\u{201c}' | '\u{201d}'))
        .collect();

    let mut collapsed = WHITESPACE_RUN_RE.replace_all(&printable, " ").to_string();

    // Separators can nest ("1,234,567"); run to fixpoint
    loop {
        let next = THOUSANDS_SEP_RE.replace_all(&collapsed, "$1$2").to_string();
        if next == collapsed {
            break;
        }
        collapsed = next;
    }

    collapsed
        .lines()
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Extractor
// ============================================================================

pub struct DocumentExtractor {
    recognizer: Arc<dyn TextRecognizer>,
    config: ExtractionConfig,
}

impl DocumentExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, config: ExtractionConfig) -> Self {
        Self { recognizer, config }
    }

    /// Full pipeline: branch on MIME type, extract text, mine line items.
    pub async fn analyze(
        &self,
        buffer: &[u8],
        mime_type: &str,
        filename: &str,
    ) -> Result<DocumentAnalysisResult, EngineError> {
        let raw_text = match mime_type {
            "application/pdf" => self.extract_pdf_text(buffer)?,
            mime if mime.starts_with("image/") => self
                .recognizer
                .recognize(buffer, mime)
                .await
                .map_err(|e| EngineError::DocumentProcessing(format!("OCR failed: {}", e)))?,
            other => {
                return Err(EngineError::Validation(format!(
                    "unsupported MIME type: {}",
                    other
                )))
            }
        };

        let text = preprocess(&raw_text);
        tracing::debug!(
            filename = %filename,
            raw_len = raw_text.len(),
            normalized_len = text.len(),
            "Document text extracted"
        );

        let items = self.mine_items(&text);
        if items.is_empty() {
            tracing::warn!(
                filename = %filename,
                mime_type = %mime_type,
                text_len = text.len(),
                "No line items cleared the confidence bar"
            );
            return Err(EngineError::NoItemsFound);
        }

        let aggregate_confidence =
            items.iter().map(|i| i.confidence).sum::<f64>() / items.len() as f64;

        tracing::info!(
            filename = %filename,
            items = items.len(),
            aggregate_confidence = format!("{:.2}", aggregate_confidence),
            "Document analysis complete"
        );

        Ok(DocumentAnalysisResult {
            items,
            metadata: DocumentMetadata {
                document_id: Uuid::new_v4(),
                filename: filename.to_string(),
                filesize: buffer.len(),
                mime_type: mime_type.to_string(),
                aggregate_confidence,
            },
        })
    }

    /// PDF text-layer extraction; pages come back concatenated in order.
    fn extract_pdf_text(&self, buffer: &[u8]) -> Result<String, EngineError> {
        let text = pdf_extract::extract_text_from_mem(buffer)
            .map_err(|e| EngineError::DocumentProcessing(format!("PDF extraction failed: {}", e)))?;
        if text.trim().is_empty() {
            return Err(EngineError::DocumentProcessing(
                "PDF contains no extractable text (scanned/image-based)".to_string(),
            ));
        }
        Ok(text)
    }

    /// Run all strategies, validate, score, filter, and flag duplicates.
    fn mine_items(&self, text: &str) -> Vec<ExtractedLineItem> {
        let candidates = strategies::run_all(text);
        let candidate_count = candidates.len();

        let mut kept: Vec<ExtractedLineItem> = Vec::new();
        let mut seen: HashSet<(String, u32, u64)> = HashSet::new();

        for raw in candidates {
            if !self.is_valid(&raw) {
                continue;
            }

            let confidence = self.score(&raw);
            if confidence <= self.config.min_confidence {
                tracing::debug!(
                    sku = %raw.sku,
                    strategy = raw.strategy,
                    confidence = format!("{:.2}", confidence),
                    "Candidate below confidence bar"
                );
                continue;
            }

            // Flag duplicate (sku, quantity, price) tuples across strategies.
            let key = (raw.sku.clone(), raw.quantity, raw.unit_price.to_bits());
            let possible_duplicate = !seen.insert(key);
            if possible_duplicate {
                tracing::warn!(
                    sku = %raw.sku,
                    quantity = raw.quantity,
                    strategy = raw.strategy,
                    "Duplicate line item across strategies"
                );
            }

            kept.push(ExtractedLineItem {
                product_name: raw.product_name,
                sku: raw.sku,
                quantity: raw.quantity,
                unit_price: raw.unit_price,
                line_total: raw.line_total,
                confidence,
                possible_duplicate,
            });
        }

        tracing::debug!(candidates = candidate_count, kept = kept.len(), "Item mining complete");
        kept
    }

    /// Basic validity: identity present, positive amounts, and a declared
    /// total that is at least in the same ballpark as qty x price. Fine-grained
    /// total deviation is a confidence penalty, not a validity failure.
    fn is_valid(&self, raw: &RawLineItem) -> bool {
        if raw.product_name.trim().is_empty() || raw.sku.trim().is_empty() {
            return false;
        }
        if raw.quantity == 0 || raw.unit_price <= 0.0 {
            return false;
        }
        if let Some(total) = raw.line_total {
            let expected = raw.quantity as f64 * raw.unit_price;
            if expected > 0.0 && ((total - expected).abs() / expected) > 0.5 {
                return false;
            }
        }
        true
    }

    /// Multiplicative confidence scoring from 1.0. Penalties compound, and a
    /// single 0.7-or-lower penalty already sinks an item below the keep bar.
    fn score(&self, raw: &RawLineItem) -> f64 {
        let mut confidence = 1.0_f64;

        if !NAME_SHAPE_RE.is_match(&raw.product_name) {
            confidence *= 0.8;
        }
        if let Some(total) = raw.line_total {
            if (total - raw.quantity as f64 * raw.unit_price).abs() > 0.01 {
                confidence *= 0.7;
            }
        }
        let (price_lo, price_hi) = self.config.price_range;
        if raw.unit_price < price_lo || raw.unit_price > price_hi {
            confidence *= 0.6;
        }
        let (qty_lo, qty_hi) = self.config.quantity_range;
        if raw.quantity < qty_lo || raw.quantity > qty_hi {
            confidence *= 0.6;
        }

        confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedRecognizer(String);

    #[async_trait]
    impl TextRecognizer for FixedRecognizer {
        async fn recognize(&self, _image: &[u8], _mime: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn extractor_with(text: &str) -> DocumentExtractor {
        DocumentExtractor::new(
            Arc::new(FixedRecognizer(text.to_string())),
            EngineConfig::default().extraction,
        )
    }

    #[test]
    fn test_preprocess_strips_thousands_and_quotes() {
        let raw = "001 \"Car Battery\" - Model A123\t 50  350.00   17,500\r\n";
        let clean = preprocess(raw);
        assert_eq!(clean, "001 Car Battery - Model A123 50 350.00 17500");
    }

    #[test]
    fn test_preprocess_nested_separators() {
        assert_eq!(preprocess("total 1,234,567"), "total 1234567");
    }

    #[tokio::test]
    async fn test_battery_line_scores_full_confidence() {
        let ex = extractor_with("001 Car Battery - Model A123 50 350.00 17,500");
        let result = ex.analyze(b"img", "image/png", "po.png").await.unwrap();

        let item = result
            .items
            .iter()
            .find(|i| !i.possible_duplicate)
            .expect("primary item");
        assert_eq!(item.product_name, "Car Battery - Model A123");
        assert_eq!(item.sku, "BAT-A123");
        assert_eq!(item.quantity, 50);
        assert_eq!(item.unit_price, 350.00);
        assert_eq!(item.line_total, Some(17500.0));
        assert_eq!(item.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_kept_items_all_above_bar() {
        let text = "001 Car Battery - Model A123 50 350.00 17500\n\
                    Terminal Cleaner Spray 24 18.50 444.00\n\
                    Cheap Widget 5 2.00 10.00";
        let ex = extractor_with(text);
        let result = ex.analyze(b"img", "image/jpeg", "po.jpg").await.unwrap();

        for item in &result.items {
            assert!(item.confidence > 0.7, "item {} at {}", item.sku, item.confidence);
            assert!(item.confidence <= 1.0);
        }
        // "Cheap Widget" at $2.00 is outside the price band (0.8 * 0.6 penalties)
        assert!(!result.items.iter().any(|i| i.product_name == "Cheap Widget"));
    }

    #[tokio::test]
    async fn test_total_mismatch_never_survives() {
        // Total off by more than the epsilon: 0.7 penalty alone lands exactly
        // on the bar, so the item must be excluded.
        let ex = extractor_with("001 Car Battery - Model A123 50 350.00 17400");
        let err = ex.analyze(b"img", "image/png", "po.png").await.unwrap_err();
        assert!(matches!(err, EngineError::NoItemsFound));
    }

    #[tokio::test]
    async fn test_duplicates_flagged_not_merged() {
        let ex = extractor_with("001 Car Battery - Model A123 50 350.00 17500");
        let result = ex.analyze(b"img", "image/png", "po.png").await.unwrap();

        // battery_line and model_line both match; the union keeps both and
        // flags the second occurrence.
        assert_eq!(result.items.len(), 2);
        assert!(!result.items[0].possible_duplicate);
        assert!(result.items[1].possible_duplicate);
        assert_eq!(result.items[0].sku, result.items[1].sku);
    }

    #[tokio::test]
    async fn test_aggregate_confidence_is_mean() {
        let ex = extractor_with("001 Car Battery - Model A123 50 350.00 17500");
        let result = ex.analyze(b"img", "image/png", "po.png").await.unwrap();
        let mean = result.items.iter().map(|i| i.confidence).sum::<f64>()
            / result.items.len() as f64;
        assert!((result.metadata.aggregate_confidence - mean).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_document_fails_with_no_items() {
        let ex = extractor_with("nothing to see here");
        let err = ex.analyze(b"img", "image/png", "blank.png").await.unwrap_err();
        assert!(matches!(err, EngineError::NoItemsFound));
    }

    #[tokio::test]
    async fn test_unsupported_mime_rejected() {
        let ex = extractor_with("irrelevant");
        let err = ex.analyze(b"x", "text/plain", "notes.txt").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
