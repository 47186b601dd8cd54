//! The fixed business-intent taxonomy.
//!
//! Static data, loaded once, never mutated: each category declares its
//! metrics and subcategories, and the classifier validates every
//! model-produced intent against this table before trusting it.

use std::collections::HashSet;

use super::IntentCategory;

pub struct SubcategorySpec {
    pub name: &'static str,
    pub metrics: &'static [&'static str],
}

pub struct CategorySpec {
    pub metrics: &'static [&'static str],
    pub subcategories: &'static [SubcategorySpec],
}

static INVENTORY: CategorySpec = CategorySpec {
    metrics: &["stock_levels", "low_stock", "product_movement", "inventory_value", "dead_stock"],
    subcategories: &[
        SubcategorySpec {
            name: "WAREHOUSE",
            metrics: &["org_structure", "bin_utilization"],
        },
        SubcategorySpec {
            name: "TRACKING",
            metrics: &["unit_tracking", "alias_matching"],
        },
    ],
};

static SALES: CategorySpec = CategorySpec {
    metrics: &["revenue", "sales_trends", "top_products", "order_count", "average_order_value"],
    subcategories: &[
        SubcategorySpec {
            name: "CUSTOMERS",
            metrics: &["top_customers", "repeat_rate"],
        },
        SubcategorySpec {
            name: "FINANCE",
            metrics: &["tax_collected", "discount_totals"],
        },
    ],
};

static APPOINTMENTS: CategorySpec = CategorySpec {
    metrics: &["upcoming_appointments", "appointment_volume", "no_show_rate", "technician_load"],
    subcategories: &[],
};

static PURCHASE_ORDERS: CategorySpec = CategorySpec {
    metrics: &["pending_orders", "order_history", "incoming_stock"],
    subcategories: &[SubcategorySpec {
        name: "VENDORS",
        metrics: &["vendor_performance", "vendor_spend"],
    }],
};

static WARRANTIES: CategorySpec = CategorySpec {
    metrics: &["active_warranties", "expiring_warranties", "claim_rate", "warranty_cost"],
    subcategories: &[],
};

static GENERAL: CategorySpec = CategorySpec {
    metrics: &[],
    subcategories: &[],
};

pub fn spec(category: IntentCategory) -> &'static CategorySpec {
    match category {
        IntentCategory::Inventory => &INVENTORY,
        IntentCategory::Sales => &SALES,
        IntentCategory::Appointments => &APPOINTMENTS,
        IntentCategory::PurchaseOrders => &PURCHASE_ORDERS,
        IntentCategory::Warranties => &WARRANTIES,
        IntentCategory::General => &GENERAL,
    }
}

/// Union of a category's own metrics and all of its subcategories' metrics.
pub fn allowed_metrics(category: IntentCategory) -> HashSet<&'static str> {
    let spec = spec(category);
    let mut set: HashSet<&'static str> = spec.metrics.iter().copied().collect();
    for sub in spec.subcategories {
        set.extend(sub.metrics.iter().copied());
    }
    set
}

/// Human-readable catalog for the classification system instruction.
pub fn prompt_catalog() -> String {
    let mut out = String::new();
    for category in IntentCategory::ALL {
        let spec = spec(category);
        out.push_str(&format!("- {}: metrics [{}]", category.as_str(), spec.metrics.join(", ")));
        for sub in spec.subcategories {
            out.push_str(&format!("; subcategory {} [{}]", sub.name, sub.metrics.join(", ")));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_metrics_includes_subcategories() {
        let allowed = allowed_metrics(IntentCategory::Inventory);
        assert!(allowed.contains("stock_levels"));
        assert!(allowed.contains("unit_tracking"));
        assert!(allowed.contains("org_structure"));
        assert!(!allowed.contains("revenue"));
    }

    #[test]
    fn test_general_has_no_metrics() {
        assert!(allowed_metrics(IntentCategory::General).is_empty());
    }

    #[test]
    fn test_prompt_catalog_names_every_category() {
        let catalog = prompt_catalog();
        for category in IntentCategory::ALL {
            assert!(catalog.contains(category.as_str()), "missing {}", category.as_str());
        }
    }
}
