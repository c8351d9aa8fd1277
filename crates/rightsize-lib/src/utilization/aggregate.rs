//! Aggregation of metric samples into average/peak summaries

use crate::models::MetricPoint;
use serde::{Deserialize, Serialize};

/// Decimal megabyte, matching how the memory metric is reported
pub const BYTES_PER_MB: f64 = 1_000_000.0;

/// Average and peak of a metric over the lookback window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub average: f64,
    pub maximum: f64,
    pub samples: usize,
}

impl UsageSummary {
    /// Scale both values by a constant factor
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            average: self.average * factor,
            maximum: self.maximum * factor,
            samples: self.samples,
        }
    }

    /// Express both values as a percentage of `total`. A zero total yields 0%.
    pub fn percent_of(self, total: f64) -> Self {
        if total <= 0.0 {
            return Self {
                average: 0.0,
                maximum: 0.0,
                samples: self.samples,
            };
        }
        self.scaled(100.0 / total)
    }
}

/// Summarize a series of points.
///
/// A point missing either its average or its maximum counts as a sample
/// with both values zero. An empty series summarizes to zero.
pub fn summarize(points: &[MetricPoint]) -> UsageSummary {
    let mut sum = 0.0;
    let mut maximum: f64 = 0.0;

    for point in points {
        let (average, peak) = match (point.average, point.maximum) {
            (Some(avg), Some(max)) => (avg, max),
            _ => (0.0, 0.0),
        };
        sum += average;
        maximum = maximum.max(peak);
    }

    let average = if points.is_empty() {
        0.0
    } else {
        sum / points.len() as f64
    };

    UsageSummary {
        average,
        maximum,
        samples: points.len(),
    }
}

/// Summarize a byte-valued series in megabytes
pub fn summarize_megabytes(points: &[MetricPoint]) -> UsageSummary {
    summarize(points).scaled(1.0 / BYTES_PER_MB)
}
