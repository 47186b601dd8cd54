use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub extraction: ExtractionConfig,
    pub finance: FinanceConfig,
    pub classifier: ClassifierConfig,
    pub query: QueryConfig,
    pub conversation: ConversationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Items at or below this confidence are discarded.
    pub min_confidence: f64,
    /// Plausible unit-price band; prices outside it are penalized, not dropped.
    pub price_range: (f64, f64),
    /// Plausible quantity band per line.
    pub quantity_range: (u32, u32),
    pub max_file_size_bytes: usize,
    pub allowed_mime_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinanceConfig {
    /// Flat sales-tax rate applied during reconciliation.
    pub tax_rate: f64,
    /// Absolute epsilon for monetary equality.
    pub money_epsilon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Cache entries older than this are re-classified.
    pub cache_ttl_secs: u64,
    /// Conversation turns included in the classification prompt.
    pub history_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Hard deadline for a single analytical query.
    pub timeout_secs: u64,
    /// Fallback window when no symbolic time range is recognized.
    pub default_range_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Sliding inactivity window; every access re-arms it.
    pub idle_timeout_secs: u64,
    /// Deadline for reply generation before degrading to a retry message.
    pub response_timeout_secs: u64,
    /// Most-recent turns fed back into reply generation.
    pub context_turns: usize,
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.extraction.min_confidence) {
            return Err("extraction.min_confidence must be in [0.0, 1.0]".into());
        }
        if self.extraction.price_range.0 >= self.extraction.price_range.1 {
            return Err("extraction.price_range must be a non-empty interval".into());
        }
        if self.extraction.quantity_range.0 == 0 {
            return Err("extraction.quantity_range lower bound must be >= 1".into());
        }
        if self.extraction.max_file_size_bytes == 0 {
            return Err("extraction.max_file_size_bytes must be > 0".into());
        }
        if !(0.0..1.0).contains(&self.finance.tax_rate) {
            return Err("finance.tax_rate must be in [0.0, 1.0)".into());
        }
        if self.finance.money_epsilon <= 0.0 {
            return Err("finance.money_epsilon must be > 0".into());
        }
        if self.classifier.cache_ttl_secs == 0 {
            return Err("classifier.cache_ttl_secs must be > 0".into());
        }
        if self.query.timeout_secs == 0 {
            return Err("query.timeout_secs must be > 0".into());
        }
        if self.query.default_range_days <= 0 {
            return Err("query.default_range_days must be > 0".into());
        }
        if self.conversation.idle_timeout_secs == 0 {
            return Err("conversation.idle_timeout_secs must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, validating before use.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig {
                min_confidence: 0.7,
                price_range: (10.0, 10_000.0),
                quantity_range: (1, 1_000),
                max_file_size_bytes: 5 * 1024 * 1024,
                allowed_mime_types: vec![
                    "application/pdf".to_string(),
                    "image/jpeg".to_string(),
                    "image/png".to_string(),
                ],
            },
            finance: FinanceConfig {
                tax_rate: 0.06,
                money_epsilon: 0.01,
            },
            classifier: ClassifierConfig {
                cache_ttl_secs: 300,
                history_turns: 3,
            },
            query: QueryConfig {
                timeout_secs: 30,
                default_range_days: 30,
            },
            conversation: ConversationConfig {
                idle_timeout_secs: 1800,
                response_timeout_secs: 30,
                context_turns: 3,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let mut cfg = EngineConfig::default();
        cfg.classifier.cache_ttl_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_price_range() {
        let mut cfg = EngineConfig::default();
        cfg.extraction.price_range = (100.0, 10.0);
        assert!(cfg.validate().is_err());
    }
}
