//! VM utilization over a lookback window
//!
//! Turns raw metric samples into CPU and memory summaries and decides
//! whether a VM is under-utilized enough to become a right-sizing candidate.

mod aggregate;
mod window;

pub use aggregate::{summarize, summarize_megabytes, UsageSummary, BYTES_PER_MB};
pub use window::{MetricWindow, DEFAULT_INTERVAL, DEFAULT_LOOKBACK_DAYS};

use crate::models::{MetricPoint, SkuProfile};
use serde::{Deserialize, Serialize};

/// Default peak utilization threshold (percent) for CPU and memory
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 50.0;

/// Platform metrics read for each VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    AvailableMemory,
}

impl MetricKind {
    /// Azure Monitor metric name
    pub fn metric_name(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "Percentage CPU",
            MetricKind::AvailableMemory => "Available Memory Bytes",
        }
    }
}

/// Thresholds below which a VM counts as under-utilized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            cpu_percent: DEFAULT_THRESHOLD_PERCENT,
            memory_percent: DEFAULT_THRESHOLD_PERCENT,
        }
    }
}

impl ThresholdPolicy {
    /// Both peaks must be strictly below their thresholds.
    ///
    /// `memory_percent` is derived from the *available* memory metric, so it
    /// is free memory as a share of the size's total, not memory in use. A VM
    /// with almost no free memory has a low value here.
    pub fn is_underutilized(&self, report: &UtilizationReport) -> bool {
        report.cpu_percent.maximum < self.cpu_percent
            && report.memory_percent.maximum < self.memory_percent
    }
}

/// CPU and memory utilization of one VM against its current size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationReport {
    pub resource_id: String,
    /// CPU percentage as reported by the platform
    pub cpu_percent: UsageSummary,
    /// Memory metric in MB
    pub memory_mb: UsageSummary,
    /// Memory metric as a percentage of the size's memory
    pub memory_percent: UsageSummary,
    pub total_memory_mb: u64,
}

impl UtilizationReport {
    pub fn build(
        resource_id: &str,
        sku: &SkuProfile,
        cpu: &[MetricPoint],
        memory: &[MetricPoint],
    ) -> Self {
        let memory_mb = summarize_megabytes(memory);
        Self {
            resource_id: resource_id.to_string(),
            cpu_percent: summarize(cpu),
            memory_mb,
            memory_percent: memory_mb.percent_of(sku.memory_mb as f64),
            total_memory_mb: sku.memory_mb,
        }
    }
}
