//! Line-item extraction strategies.
//!
//! Each strategy is an independent (pattern, extractor) pair recognizing one
//! textual layout. Every strategy runs over the full document text and all
//! matches are concatenated; there is no dedup between strategies, so one
//! physical line can surface under two patterns. The extractor flags those
//! duplicates downstream instead of merging them.

use std::sync::LazyLock;

/// A candidate item before validation and confidence scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLineItem {
    pub product_name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub line_total: Option<f64>,
    /// Which strategy produced this candidate (for logging).
    pub strategy: &'static str,
}

// Strict battery-catalog layout: "001 Car Battery - Model A123 50 350.00 17500"
static BATTERY_LINE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?m)^(\d{3})\s+((?:Car|Truck) Battery\s*-\s*Model\s+([A-Z]+\d+[A-Z0-9]*))\s+(\d+)\s+(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)\s*$",
    )
    .expect("battery line regex is valid")
});

// Loose model-number layout: any line naming "Model <code>" followed by
// quantity and price, total optional.
static MODEL_LINE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?m)^(?:\d{1,4}\s+)?([A-Za-z][A-Za-z .\-]*Model\s+([A-Z]+\d+[A-Z0-9]*))\s+(\d+)\s+(\d+(?:\.\d+)?)(?:\s+(\d+(?:\.\d+)?))?\s*$",
    )
    .expect("model line regex is valid")
});

// Generic tabular layout: "<name> <qty> <price> [<total>]" with an optional
// leading row index. Requires a multi-word alphabetic name so bare numeric
// rows don't match.
static TABULAR_LINE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?m)^(?:\d{1,4}\s+)?([A-Za-z][A-Za-z .\-/]+[A-Za-z])\s+(\d{1,4})\s+(\d+(?:\.\d+)?)(?:\s+(\d+(?:\.\d+)?))?\s*$",
    )
    .expect("tabular line regex is valid")
});

/// Model-code capture inside a free-form description, used for SKU derivation.
pub static MODEL_CODE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"Model\s+([A-Z]+\d+[A-Z0-9]*)").expect("model code regex is valid")
});

/// Expected catalog shape for a product name. Names outside this shape are
/// penalized during confidence scoring, not rejected.
pub static NAME_SHAPE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^(Car|Truck) Battery\b.*\bModel\s+[A-Z]+\d+")
        .expect("name shape regex is valid")
});

/// SKU derived from a model code, matching the catalog convention.
pub fn sku_from_model_code(code: &str) -> String {
    format!("BAT-{}", code.to_uppercase())
}

/// Fallback SKU for names without a model code: first 10 alphanumerics,
/// uppercased. Deterministic so repeat uploads derive the same SKU.
pub fn sku_from_name(name: &str) -> String {
    let compact: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(10)
        .collect::<String>()
        .to_uppercase();
    format!("SKU-{}", compact)
}

fn extract_battery_lines(text: &str) -> Vec<RawLineItem> {
    BATTERY_LINE_RE
        .captures_iter(text)
        .filter_map(|cap| {
            Some(RawLineItem {
                product_name: cap[2].trim().to_string(),
                sku: sku_from_model_code(&cap[3]),
                quantity: cap[4].parse().ok()?,
                unit_price: cap[5].parse().ok()?,
                line_total: cap[6].parse().ok(),
                strategy: "battery_line",
            })
        })
        .collect()
}

fn extract_model_lines(text: &str) -> Vec<RawLineItem> {
    MODEL_LINE_RE
        .captures_iter(text)
        .filter_map(|cap| {
            Some(RawLineItem {
                product_name: cap[1].trim().to_string(),
                sku: sku_from_model_code(&cap[2]),
                quantity: cap[3].parse().ok()?,
                unit_price: cap[4].parse().ok()?,
                line_total: cap.get(5).and_then(|m| m.as_str().parse().ok()),
                strategy: "model_line",
            })
        })
        .collect()
}

fn extract_tabular_lines(text: &str) -> Vec<RawLineItem> {
    TABULAR_LINE_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let name = cap[1].trim().to_string();
            let sku = match MODEL_CODE_RE.captures(&name) {
                Some(code) => sku_from_model_code(&code[1]),
                None => sku_from_name(&name),
            };
            Some(RawLineItem {
                product_name: name,
                sku,
                quantity: cap[2].parse().ok()?,
                unit_price: cap[3].parse().ok()?,
                line_total: cap.get(4).and_then(|m| m.as_str().parse().ok()),
                strategy: "tabular_line",
            })
        })
        .collect()
}

/// Run every strategy in order and concatenate all matches.
pub fn run_all(text: &str) -> Vec<RawLineItem> {
    let strategies: [(&'static str, fn(&str) -> Vec<RawLineItem>); 3] = [
        ("battery_line", extract_battery_lines),
        ("model_line", extract_model_lines),
        ("tabular_line", extract_tabular_lines),
    ];

    let mut candidates = Vec::new();
    for (name, extract) in strategies {
        let matches = extract(text);
        if !matches.is_empty() {
            tracing::debug!(strategy = name, matches = matches.len(), "Strategy produced candidates");
        }
        candidates.extend(matches);
    }
    candidates
}
