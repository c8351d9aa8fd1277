//! Metric lookback window

use chrono::{Days, NaiveDate, Utc};

/// Default lookback period in days
pub const DEFAULT_LOOKBACK_DAYS: u64 = 14;

/// Default sampling granularity (ISO 8601 duration)
pub const DEFAULT_INTERVAL: &str = "PT24H";

/// Time range and granularity used when querying metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: String,
}

impl MetricWindow {
    /// Window ending today (UTC) and reaching back `lookback_days`
    pub fn last_days(lookback_days: u64) -> Self {
        Self::ending_at(Utc::now().date_naive(), lookback_days)
    }

    pub fn ending_at(end: NaiveDate, lookback_days: u64) -> Self {
        let start = end.checked_sub_days(Days::new(lookback_days)).unwrap_or(NaiveDate::MIN);
        Self {
            start,
            end,
            interval: DEFAULT_INTERVAL.to_string(),
        }
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = interval.into();
        self
    }

    /// ARM `timespan` query value (`start/end`)
    pub fn timespan(&self) -> String {
        format!("{}/{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

impl Default for MetricWindow {
    fn default() -> Self {
        Self::last_days(DEFAULT_LOOKBACK_DAYS)
    }
}
