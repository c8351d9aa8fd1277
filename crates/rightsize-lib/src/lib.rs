//! Core library for Azure virtual machine right-sizing
//!
//! This crate provides the core functionality for:
//! - SKU name parsing and right-size selection
//! - Utilization aggregation over a lookback window
//! - Azure Resource Manager and offline inventory providers
//! - Scan and resize passes with CSV export
//! - Metrics and structured logging

pub mod error;
pub mod export;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod provider;
pub mod sku;
pub mod utilization;

pub use error::{ProviderError, ProviderResult};
pub use export::{CsvSink, ResizeRow, RowSink, UtilizationRow};
pub use models::*;
pub use observability::{RightsizeMetrics, StructuredLogger};
pub use pipeline::{run_resize, run_scan, CandidateTag, ResizeSummary, RunContext, ScanSummary};
pub use sku::{select_right_size, SizeMatcher};
