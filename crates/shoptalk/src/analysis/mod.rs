//! Purchase-order analysis: cross-reference extracted items against the
//! product catalog and reconcile the vendor's declared financial totals.

pub mod warranty;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::FinanceConfig;
use crate::extraction::strategies::MODEL_CODE_RE;
use crate::extraction::ExtractedLineItem;

pub use warranty::{WarrantyScope, WarrantySuggestion};

// ============================================================================
// Catalog boundary
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub manufacturer: String,
    pub unit_price: f64,
    pub requires_warranty: bool,
    /// Warranty-scope tag carried by the product ("manufacturer"/"consumer").
    pub warranty_type: Option<String>,
    pub warranty_months: Option<u32>,
}

/// Read access to the operational product/warranty data. The relational
/// schema behind it is a collaborator, not part of this engine.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_by_sku(&self, sku: &str) -> Result<Option<CatalogProduct>>;
    async fn find_by_name(&self, name: &str) -> Result<Option<CatalogProduct>>;
    /// Up to `limit` historical products sharing manufacturer and category
    /// that carry the given warranty-scope tag.
    async fn find_similar(
        &self,
        manufacturer: &str,
        category: &str,
        warranty_tag: &str,
        limit: usize,
    ) -> Result<Vec<CatalogProduct>>;
}

// ============================================================================
// Analysis result types
// ============================================================================

/// Vendor-declared figures from the document header/footer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredTotals {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub shipping_fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProductEntry {
    pub product_name: String,
    pub suggested_sku: String,
    pub inferred_category: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty: Option<WarrantySuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingProductEntry {
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub vendor_price: f64,
    pub catalog_price: f64,
    pub price_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty: Option<WarrantySuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialCalculations {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub shipping_fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialValidation {
    pub subtotal_match: bool,
    pub tax_match: bool,
    pub total_match: bool,
    pub calculations: FinancialCalculations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedAction {
    Confirm,
    Edit,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderAnalysis {
    pub new_products: Vec<NewProductEntry>,
    pub existing_products: Vec<ExistingProductEntry>,
    pub financial_validation: FinancialValidation,
    pub suggested_actions: Vec<SuggestedAction>,
    pub blocking_issues: Vec<String>,
}

// ============================================================================
// Analyzer
// ============================================================================

pub struct PurchaseOrderAnalyzer {
    catalog: Arc<dyn ProductCatalog>,
    config: FinanceConfig,
}

impl PurchaseOrderAnalyzer {
    /// Similar-product sample cap for warranty refinement.
    const SIMILAR_LIMIT: usize = 5;

    pub fn new(catalog: Arc<dyn ProductCatalog>, config: FinanceConfig) -> Self {
        Self { catalog, config }
    }

    pub async fn analyze(
        &self,
        items: &[ExtractedLineItem],
        declared: &DeclaredTotals,
    ) -> Result<PurchaseOrderAnalysis> {
        let mut new_products = Vec::new();
        let mut existing_products = Vec::new();

        for item in items {
            match self.lookup(item).await? {
                Some(product) => {
                    let price_changed =
                        (item.unit_price - product.unit_price).abs() > self.config.money_epsilon;
                    let warranty = if product.requires_warranty {
                        Some(self.suggest_warranty(&product).await?)
                    } else {
                        None
                    };
                    existing_products.push(ExistingProductEntry {
                        product_id: product.id,
                        sku: product.sku,
                        name: product.name,
                        quantity: item.quantity,
                        vendor_price: item.unit_price,
                        catalog_price: product.unit_price,
                        price_changed,
                        warranty,
                    });
                }
                None => {
                    let category = infer_category(&item.product_name);
                    let warranty = if warranty::is_battery_category(&category) {
                        // No purchase history for a brand-new product; the
                        // base rule table is the whole suggestion.
                        Some(WarrantySuggestion {
                            manufacturer_months: warranty::base_months(
                                &category,
                                WarrantyScope::Manufacturer,
                            ),
                            consumer_months: warranty::base_months(
                                &category,
                                WarrantyScope::Consumer,
                            ),
                            sample_size: 0,
                        })
                    } else {
                        None
                    };
                    new_products.push(NewProductEntry {
                        product_name: item.product_name.clone(),
                        suggested_sku: item.sku.clone(),
                        inferred_category: category,
                        quantity: item.quantity,
                        unit_price: item.unit_price,
                        warranty,
                    });
                }
            }
        }

        let financial_validation = self.reconcile(items, declared);

        let mut blocking_issues = Vec::new();
        if !new_products.is_empty() {
            blocking_issues.push(format!(
                "{} product(s) not found in the catalog",
                new_products.len()
            ));
        }
        if !financial_validation.subtotal_match
            || !financial_validation.tax_match
            || !financial_validation.total_match
        {
            blocking_issues.push("declared totals do not reconcile".to_string());
        }

        // Confirm is only offered when nothing blocks it.
        let suggested_actions = if blocking_issues.is_empty() {
            vec![SuggestedAction::Confirm, SuggestedAction::Edit, SuggestedAction::Cancel]
        } else {
            vec![SuggestedAction::Edit, SuggestedAction::Cancel]
        };

        tracing::info!(
            new_products = new_products.len(),
            existing_products = existing_products.len(),
            blocking = blocking_issues.len(),
            "Purchase order analysis complete"
        );

        Ok(PurchaseOrderAnalysis {
            new_products,
            existing_products,
            financial_validation,
            suggested_actions,
            blocking_issues,
        })
    }

    /// Catalog lookup: derived-SKU pattern first, literal name second.
    async fn lookup(&self, item: &ExtractedLineItem) -> Result<Option<CatalogProduct>> {
        let derived_sku = MODEL_CODE_RE
            .captures(&item.product_name)
            .map(|cap| format!("BAT-{}", cap[1].to_uppercase()));

        if let Some(sku) = derived_sku {
            if let Some(product) = self.catalog.find_by_sku(&sku).await? {
                return Ok(Some(product));
            }
        }
        self.catalog.find_by_name(&item.product_name).await
    }

    /// Base rule-table durations, refined per scope by up to five similar
    /// historical products carrying the matching warranty-type tag.
    async fn suggest_warranty(&self, product: &CatalogProduct) -> Result<WarrantySuggestion> {
        let mut sample_size = 0;
        let months_for = |scope: WarrantyScope, observed: &[u32]| {
            warranty::refine_months(warranty::base_months(&product.category, scope), observed)
        };

        let mut observed_by_scope = [Vec::new(), Vec::new()];
        for (idx, scope) in [WarrantyScope::Manufacturer, WarrantyScope::Consumer]
            .into_iter()
            .enumerate()
        {
            let similar = self
                .catalog
                .find_similar(
                    &product.manufacturer,
                    &product.category,
                    scope.tag(),
                    Self::SIMILAR_LIMIT,
                )
                .await?;
            sample_size += similar.len();
            observed_by_scope[idx] = similar.iter().filter_map(|p| p.warranty_months).collect();
        }

        Ok(WarrantySuggestion {
            manufacturer_months: months_for(WarrantyScope::Manufacturer, &observed_by_scope[0]),
            consumer_months: months_for(WarrantyScope::Consumer, &observed_by_scope[1]),
            sample_size,
        })
    }

    /// Recompute totals from line items and compare each declared figure
    /// within the monetary epsilon.
    fn reconcile(&self, items: &[ExtractedLineItem], declared: &DeclaredTotals) -> FinancialValidation {
        let subtotal: f64 = items
            .iter()
            .map(|i| i.quantity as f64 * i.unit_price)
            .sum();
        let tax = subtotal * self.config.tax_rate;
        let total = subtotal + tax + declared.shipping_fee;

        let eps = self.config.money_epsilon;
        FinancialValidation {
            subtotal_match: (subtotal - declared.subtotal).abs() <= eps,
            tax_match: (tax - declared.tax).abs() <= eps,
            total_match: (total - declared.total).abs() <= eps,
            calculations: FinancialCalculations {
                subtotal,
                tax,
                total,
                shipping_fee: declared.shipping_fee,
            },
        }
    }
}

/// Keyword-based category inference for products missing from the catalog.
pub fn infer_category(product_name: &str) -> String {
    let lower = product_name.to_lowercase();
    if lower.contains("truck") {
        "truck_battery".to_string()
    } else if lower.contains("car") || lower.contains("battery") {
        "car_battery".to_string()
    } else {
        "accessory".to_string()
    }
}
