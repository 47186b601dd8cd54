//! Query execution against the analytics store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::{json, Value};

use super::templates;
use super::{resolve_time_range, Aggregation, TimeRange};
use crate::config::QueryConfig;
use crate::error::EngineError;
use crate::intent::{IntentCategory, IntentParameters};

pub type Row = HashMap<String, Value>;

/// Relational backend seam. Implementations bind the named parameters
/// and run the statement; the executor owns timeouts and validation.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn fetch(&self, sql: &str, params: &HashMap<String, Value>) -> anyhow::Result<Vec<Row>>;
}

const ORDER_STATUSES: [&str; 5] = ["draft", "pending", "approved", "received", "cancelled"];

pub struct QueryExecutor {
    store: Arc<dyn AnalyticsStore>,
    config: QueryConfig,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn AnalyticsStore>, config: QueryConfig) -> Self {
        QueryExecutor { store, config }
    }

    /// Run one metric. The fetch races a fixed timeout; on elapse the
    /// losing future is dropped and a `QueryTimeout` (distinct from
    /// `QueryFailed`) is returned.
    pub async fn execute(
        &self,
        organization_id: i64,
        category: IntentCategory,
        metric: &str,
        parameters: &IntentParameters,
    ) -> Result<Vec<Row>, EngineError> {
        validate_parameters(parameters)?;

        let sql = templates::template_for(category, metric).ok_or_else(|| {
            EngineError::UnknownMetric {
                category: category.as_str().to_string(),
                metric: metric.to_string(),
            }
        })?;

        let range = resolve_time_range(
            parameters.time_range.as_deref(),
            self.config.default_range_days,
            Utc::now(),
        );
        let bindings = bind_parameters(organization_id, parameters, &range);

        tracing::debug!(
            metric = %metric,
            category = %category.as_str(),
            start = %range.start_date,
            end = %range.end_date,
            "executing analytics query"
        );

        match tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.store.fetch(sql, &bindings),
        )
        .await
        {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(EngineError::QueryFailed {
                metric: metric.to_string(),
                source: e,
            }),
            Err(_) => {
                tracing::warn!(metric = %metric, seconds = self.config.timeout_secs, "query timed out");
                Err(EngineError::QueryTimeout {
                    metric: metric.to_string(),
                    seconds: self.config.timeout_secs,
                })
            }
        }
    }

    /// Run a list of metrics sequentially. Each failure is recorded
    /// inline as `{"error", "code"}` under its metric name; siblings
    /// still run.
    pub async fn execute_aggregated(
        &self,
        organization_id: i64,
        category: IntentCategory,
        metrics: &[String],
        parameters: &IntentParameters,
    ) -> HashMap<String, Value> {
        let granularity = Aggregation::from_keyword(parameters.aggregation.as_deref());
        let mut results = HashMap::with_capacity(metrics.len());

        for metric in metrics {
            let value = match self.execute(organization_id, category, metric, parameters).await {
                Ok(rows) => {
                    let rows = aggregate_rows(rows, granularity);
                    json!({ "rows": rows })
                }
                Err(e) => {
                    tracing::warn!(metric = %metric, error = %e, "metric failed in batch");
                    json!({ "error": e.to_string(), "code": e.code() })
                }
            };
            results.insert(metric.clone(), value);
        }

        results
    }
}

// ---------------------------------------------------------------------------
// Parameter validation and binding
// ---------------------------------------------------------------------------

/// Reject out-of-range inputs before any SQL is constructed.
fn validate_parameters(parameters: &IntentParameters) -> Result<(), EngineError> {
    if let Some(vendor_id) = parameters.vendor_id {
        if vendor_id <= 0 {
            return Err(EngineError::Validation(format!(
                "vendor id must be a positive integer, got {vendor_id}"
            )));
        }
    }

    if let Some(status) = parameters.order_status.as_deref() {
        if !ORDER_STATUSES.contains(&status.to_lowercase().as_str()) {
            return Err(EngineError::Validation(format!(
                "unknown order status '{status}', expected one of {}",
                ORDER_STATUSES.join(", ")
            )));
        }
    }

    for (key, value) in &parameters.filters {
        if value.parse::<f64>().is_err() {
            return Err(EngineError::Validation(format!(
                "filter '{key}' must be numeric, got '{value}'"
            )));
        }
    }

    Ok(())
}

fn bind_parameters(
    organization_id: i64,
    parameters: &IntentParameters,
    range: &TimeRange,
) -> HashMap<String, Value> {
    let mut bindings = HashMap::new();
    bindings.insert("org_id".to_string(), json!(organization_id));
    bindings.insert("start_date".to_string(), json!(range.start_date.to_rfc3339()));
    bindings.insert("end_date".to_string(), json!(range.end_date.to_rfc3339()));

    if let Some(serial) = &parameters.serial_number {
        bindings.insert("serial_number".to_string(), json!(serial));
    }
    if let Some(item) = &parameters.specific_item {
        bindings.insert("item_pattern".to_string(), json!(format!("%{item}%")));
    }
    if let Some(threshold) = parameters.confidence_threshold {
        bindings.insert("confidence_threshold".to_string(), json!(threshold));
    }
    if let Some(vendor_id) = parameters.vendor_id {
        bindings.insert("vendor_id".to_string(), json!(vendor_id));
    }
    if let Some(status) = &parameters.order_status {
        bindings.insert("status".to_string(), json!(status.to_lowercase()));
    }
    for (key, value) in &parameters.filters {
        bindings.insert(key.clone(), json!(value.parse::<f64>().unwrap_or_default()));
    }

    bindings
}

// ---------------------------------------------------------------------------
// Post-aggregation
// ---------------------------------------------------------------------------

/// Bucket rows on their date column and sum every numeric column.
/// Rows without a recognizable date pass through untouched, as does the
/// whole set when granularity is `None`.
fn aggregate_rows(rows: Vec<Row>, granularity: Aggregation) -> Vec<Row> {
    if granularity == Aggregation::None || rows.is_empty() {
        return rows;
    }

    let mut buckets: BTreeMap<String, Row> = BTreeMap::new();
    let mut passthrough: Vec<Row> = Vec::new();

    for row in rows {
        let Some(date) = row_date(&row) else {
            passthrough.push(row);
            continue;
        };

        let key = bucket_key(date, granularity);
        let bucket = buckets.entry(key.clone()).or_insert_with(|| {
            let mut fresh = Row::new();
            fresh.insert("bucket".to_string(), json!(key));
            fresh
        });

        for (column, value) in &row {
            let Some(n) = value.as_f64() else { continue };
            let total = bucket
                .get(column)
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            bucket.insert(column.clone(), json!(total + n));
        }
    }

    buckets.into_values().chain(passthrough).collect()
}

fn row_date(row: &Row) -> Option<NaiveDate> {
    let candidate = row
        .get("date")
        .or_else(|| row.get("created_at"))
        .or_else(|| row.get("scheduled_at"))?;
    let s = candidate.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn bucket_key(date: NaiveDate, granularity: Aggregation) -> String {
    match granularity {
        Aggregation::None | Aggregation::Daily => date.format("%Y-%m-%d").to_string(),
        Aggregation::Weekly => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Aggregation::Monthly => date.format("%Y-%m").to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
