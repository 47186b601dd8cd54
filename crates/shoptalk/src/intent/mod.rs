//! Intent classification: turning a free-form chat message into a
//! structured, validated analytics request.

pub mod classifier;
pub mod taxonomy;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use classifier::IntentClassifier;

// ============================================================================
// Categories
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentCategory {
    Inventory,
    Sales,
    Appointments,
    PurchaseOrders,
    Warranties,
    General,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 6] = [
        IntentCategory::Inventory,
        IntentCategory::Sales,
        IntentCategory::Appointments,
        IntentCategory::PurchaseOrders,
        IntentCategory::Warranties,
        IntentCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Inventory => "INVENTORY",
            IntentCategory::Sales => "SALES",
            IntentCategory::Appointments => "APPOINTMENTS",
            IntentCategory::PurchaseOrders => "PURCHASE_ORDERS",
            IntentCategory::Warranties => "WARRANTIES",
            IntentCategory::General => "GENERAL",
        }
    }

    fn from_loose(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase().replace([' ', '-'], "_");
        Self::ALL.iter().copied().find(|c| c.as_str() == upper)
    }
}

// ============================================================================
// Classified intent
// ============================================================================

/// Extracted query parameters. Every field is optional on the wire; the
/// executor decides per metric which ones it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntentParameters {
    pub time_range: Option<String>,
    pub specific_item: Option<String>,
    pub organization_id: Option<i64>,
    pub serial_number: Option<String>,
    pub vendor_id: Option<i64>,
    pub order_status: Option<String>,
    pub aggregation: Option<String>,
    pub hierarchy_scope: Option<String>,
    /// Minimum match confidence for fuzzy product-alias lookups.
    pub confidence_threshold: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unit_level_detail: bool,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub filters: HashMap<String, String>,
}

/// Execution hints derived from the question itself.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntentContext {
    pub requires_historical_data: bool,
    pub needs_comparison: bool,
    pub stock_alert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub category: IntentCategory,
    /// Free-form label the model chose, e.g. "check_stock".
    pub intent: String,
    /// Validated metric names, deduplicated, original order preserved.
    pub metrics: Vec<String>,
    #[serde(default)]
    pub parameters: IntentParameters,
    #[serde(default)]
    pub context: IntentContext,
}

impl Intent {
    /// Safe default used whenever classification cannot produce a
    /// trustworthy result.
    pub fn fallback() -> Self {
        Intent {
            category: IntentCategory::General,
            intent: "unknown".to_string(),
            metrics: Vec::new(),
            parameters: IntentParameters {
                time_range: Some("today".to_string()),
                ..Default::default()
            },
            context: IntentContext::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_wire_names() {
        let json = serde_json::to_string(&IntentCategory::PurchaseOrders).unwrap();
        assert_eq!(json, "\"PURCHASE_ORDERS\"");
        let back: IntentCategory = serde_json::from_str("\"INVENTORY\"").unwrap();
        assert_eq!(back, IntentCategory::Inventory);
    }

    #[test]
    fn test_category_from_loose() {
        assert_eq!(IntentCategory::from_loose("purchase orders"), Some(IntentCategory::PurchaseOrders));
        assert_eq!(IntentCategory::from_loose("Sales"), Some(IntentCategory::Sales));
        assert_eq!(IntentCategory::from_loose("weather"), None);
    }

    #[test]
    fn test_fallback_defaults_to_today() {
        let intent = Intent::fallback();
        assert_eq!(intent.category, IntentCategory::General);
        assert_eq!(intent.intent, "unknown");
        assert!(intent.metrics.is_empty());
        assert_eq!(intent.parameters.time_range.as_deref(), Some("today"));
    }
}
