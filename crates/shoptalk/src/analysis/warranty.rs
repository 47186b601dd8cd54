//! Warranty duration rules.
//!
//! Two tiers (battery vs everything else) by two scopes (manufacturer-facing
//! vs consumer-facing). Kept as inspectable static data rather than buried
//! branch logic so the table can be tested and tuned in isolation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarrantyScope {
    Manufacturer,
    Consumer,
}

impl WarrantyScope {
    pub fn tag(&self) -> &'static str {
        match self {
            WarrantyScope::Manufacturer => "manufacturer",
            WarrantyScope::Consumer => "consumer",
        }
    }
}

/// (battery tier?, scope) -> months. Battery products carry longer cover.
const RULES: [((bool, WarrantyScope), u32); 4] = [
    ((true, WarrantyScope::Manufacturer), 24),
    ((true, WarrantyScope::Consumer), 12),
    ((false, WarrantyScope::Manufacturer), 12),
    ((false, WarrantyScope::Consumer), 6),
];

pub fn is_battery_category(category: &str) -> bool {
    category.to_lowercase().contains("battery")
}

/// Base duration in months for a category/scope pair.
pub fn base_months(category: &str, scope: WarrantyScope) -> u32 {
    let battery = is_battery_category(category);
    RULES
        .iter()
        .find(|((tier, s), _)| *tier == battery && *s == scope)
        .map(|(_, months)| *months)
        .unwrap_or(6)
}

/// Refine a base duration by averaging durations seen on similar historical
/// products. An empty sample leaves the base untouched.
pub fn refine_months(base: u32, observed: &[u32]) -> u32 {
    if observed.is_empty() {
        return base;
    }
    let sum: u64 = observed.iter().map(|m| *m as u64).sum();
    ((sum as f64 / observed.len() as f64).round()) as u32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantySuggestion {
    pub manufacturer_months: u32,
    pub consumer_months: u32,
    /// How many similar historical products informed the refinement.
    pub sample_size: usize,
}
