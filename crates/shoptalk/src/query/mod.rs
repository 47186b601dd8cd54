//! Template-driven analytics queries.
//!
//! The classifier produces a (category, metrics, parameters) triple; this
//! module resolves symbolic time ranges, binds named parameters into the
//! static SQL registry, and executes against whatever [`AnalyticsStore`]
//! backs the deployment, with a hard per-query timeout.

pub mod executor;
pub mod templates;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use executor::{AnalyticsStore, QueryExecutor, Row};

// ============================================================================
// Time ranges
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Map a symbolic range keyword onto concrete bounds. `end_date` is
/// always `now`; unknown or absent keywords fall back to the configured
/// default window.
pub fn resolve_time_range(keyword: Option<&str>, default_days: i64, now: DateTime<Utc>) -> TimeRange {
    let start_date = match keyword.map(str::trim).map(str::to_lowercase).as_deref() {
        Some("today") => now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now),
        Some("week") => now - chrono::Duration::days(7),
        Some("month") => now - chrono::Duration::days(30),
        Some("quarter") => now - chrono::Duration::days(90),
        Some("year") => now - chrono::Duration::days(365),
        _ => now - chrono::Duration::days(default_days),
    };
    TimeRange {
        start_date,
        end_date: now,
    }
}

// ============================================================================
// Aggregation granularity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

impl Aggregation {
    pub fn from_keyword(keyword: Option<&str>) -> Self {
        match keyword.map(str::trim).map(str::to_lowercase).as_deref() {
            Some("daily") => Aggregation::Daily,
            Some("weekly") => Aggregation::Weekly,
            Some("monthly") => Aggregation::Monthly,
            _ => Aggregation::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_today_starts_at_midnight() {
        let range = resolve_time_range(Some("today"), 30, noon());
        assert_eq!(range.start_date, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
        assert_eq!(range.end_date, noon());
    }

    #[test]
    fn test_symbolic_offsets() {
        let now = noon();
        assert_eq!(resolve_time_range(Some("week"), 30, now).start_date, now - chrono::Duration::days(7));
        assert_eq!(resolve_time_range(Some("quarter"), 30, now).start_date, now - chrono::Duration::days(90));
        assert_eq!(resolve_time_range(Some("YEAR"), 30, now).start_date, now - chrono::Duration::days(365));
    }

    #[test]
    fn test_unknown_keyword_uses_default_window() {
        let now = noon();
        let range = resolve_time_range(Some("fortnight"), 30, now);
        assert_eq!(range.start_date, now - chrono::Duration::days(30));
        let absent = resolve_time_range(None, 30, now);
        assert_eq!(absent.start_date, now - chrono::Duration::days(30));
    }

    #[test]
    fn test_aggregation_keywords() {
        assert_eq!(Aggregation::from_keyword(Some("daily")), Aggregation::Daily);
        assert_eq!(Aggregation::from_keyword(Some("Monthly")), Aggregation::Monthly);
        assert_eq!(Aggregation::from_keyword(Some("hourly")), Aggregation::None);
        assert_eq!(Aggregation::from_keyword(None), Aggregation::None);
    }
}
