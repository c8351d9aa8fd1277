//! Observability infrastructure for right-sizing runs
//!
//! Provides:
//! - Prometheus counters for scan/resize outcomes and ARM request latency
//! - Text exposition for node-exporter style textfile collection
//! - Structured JSON logging with tracing

use anyhow::{Context, Result};
use prometheus::{
    register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for ARM request latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RightsizeMetricsInner> = OnceLock::new();

struct RightsizeMetricsInner {
    request_latency_seconds: Histogram,
    vms_evaluated: IntCounter,
    vms_skipped: IntCounter,
    candidates_tagged: IntCounter,
    tag_conflicts: IntCounter,
    vms_resized: IntCounter,
    no_candidate: IntCounter,
    resize_failures: IntCounter,
    provider_errors: IntCounter,
}

impl RightsizeMetricsInner {
    fn new() -> Self {
        Self {
            request_latency_seconds: register_histogram!(
                "rightsizer_arm_request_latency_seconds",
                "Latency of Azure Resource Manager requests",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register arm_request_latency_seconds"),

            vms_evaluated: register_int_counter!(
                "rightsizer_vms_evaluated_total",
                "Virtual machines evaluated by a scan or resize pass"
            )
            .expect("Failed to register vms_evaluated"),

            vms_skipped: register_int_counter!(
                "rightsizer_vms_skipped_total",
                "Virtual machines skipped (generalized or unknown size)"
            )
            .expect("Failed to register vms_skipped"),

            candidates_tagged: register_int_counter!(
                "rightsizer_candidates_tagged_total",
                "Under-utilized virtual machines tagged as right-sizing candidates"
            )
            .expect("Failed to register candidates_tagged"),

            tag_conflicts: register_int_counter!(
                "rightsizer_tag_conflicts_total",
                "Candidate tag requests that conflicted with existing state"
            )
            .expect("Failed to register tag_conflicts"),

            vms_resized: register_int_counter!(
                "rightsizer_vms_resized_total",
                "Virtual machines resized to a smaller size"
            )
            .expect("Failed to register vms_resized"),

            no_candidate: register_int_counter!(
                "rightsizer_no_candidate_total",
                "Tagged virtual machines with no compatible smaller size"
            )
            .expect("Failed to register no_candidate"),

            resize_failures: register_int_counter!(
                "rightsizer_resize_failures_total",
                "Resize requests whose result could not be verified"
            )
            .expect("Failed to register resize_failures"),

            provider_errors: register_int_counter!(
                "rightsizer_provider_errors_total",
                "Provider errors that caused a virtual machine to be skipped"
            )
            .expect("Failed to register provider_errors"),
        }
    }
}

/// Right-sizer metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct RightsizeMetrics {
    _private: (),
}

impl Default for RightsizeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RightsizeMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RightsizeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RightsizeMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_request_latency(&self, duration_secs: f64) {
        self.inner().request_latency_seconds.observe(duration_secs);
    }

    pub fn inc_vms_evaluated(&self) {
        self.inner().vms_evaluated.inc();
    }

    pub fn inc_vms_skipped(&self) {
        self.inner().vms_skipped.inc();
    }

    pub fn inc_candidates_tagged(&self) {
        self.inner().candidates_tagged.inc();
    }

    pub fn inc_tag_conflicts(&self) {
        self.inner().tag_conflicts.inc();
    }

    pub fn inc_vms_resized(&self) {
        self.inner().vms_resized.inc();
    }

    pub fn inc_no_candidate(&self) {
        self.inner().no_candidate.inc();
    }

    pub fn inc_resize_failures(&self) {
        self.inner().resize_failures.inc();
    }

    pub fn inc_provider_errors(&self) {
        self.inner().provider_errors.inc();
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not UTF-8")
    }

    /// Write the text exposition to a file (textfile collector)
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write metrics file {}", path.display()))
    }
}

/// Structured logger for right-sizing events
///
/// Emits one consistently shaped record per significant event so runs can
/// be audited from the JSON log stream.
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_run_started(&self, pass: &str, dry_run: bool) {
        info!(
            event = "run_started",
            run_id = %self.run_id,
            pass = %pass,
            dry_run = dry_run,
            "Right-sizing pass started"
        );
    }

    pub fn log_run_finished(&self, pass: &str, evaluated: usize, changed: usize, errors: usize) {
        info!(
            event = "run_finished",
            run_id = %self.run_id,
            pass = %pass,
            evaluated = evaluated,
            changed = changed,
            errors = errors,
            "Right-sizing pass finished"
        );
    }

    pub fn log_vm_skipped(&self, vm_id: &str, reason: &str) {
        info!(
            event = "vm_skipped",
            run_id = %self.run_id,
            vm_id = %vm_id,
            reason = %reason,
            "Skipping virtual machine"
        );
    }

    pub fn log_utilization(
        &self,
        vm_id: &str,
        vm_size: &str,
        max_cpu_percent: f64,
        max_memory_percent: f64,
        underutilized: bool,
    ) {
        info!(
            event = "utilization_measured",
            run_id = %self.run_id,
            vm_id = %vm_id,
            vm_size = %vm_size,
            max_cpu_percent = max_cpu_percent,
            max_memory_percent = max_memory_percent,
            underutilized = underutilized,
            "Measured virtual machine utilization"
        );
    }

    pub fn log_candidate_tagged(&self, vm_id: &str, tag_key: &str, tag_value: &str) {
        info!(
            event = "candidate_tagged",
            run_id = %self.run_id,
            vm_id = %vm_id,
            tag_key = %tag_key,
            tag_value = %tag_value,
            "Tagged right-sizing candidate"
        );
    }

    pub fn log_tag_conflict(&self, vm_id: &str, details: &str) {
        info!(
            event = "tag_conflict",
            run_id = %self.run_id,
            vm_id = %vm_id,
            details = %details,
            "Candidate tag conflicted with existing state, recorded as SPOT"
        );
    }

    pub fn log_resize_planned(&self, vm_id: &str, from: &str, to: &str) {
        info!(
            event = "resize_planned",
            run_id = %self.run_id,
            vm_id = %vm_id,
            from_size = %from,
            to_size = %to,
            "Dry run: would resize virtual machine"
        );
    }

    pub fn log_resized(&self, vm_id: &str, from: &str, to: &str) {
        info!(
            event = "vm_resized",
            run_id = %self.run_id,
            vm_id = %vm_id,
            from_size = %from,
            to_size = %to,
            "Resized virtual machine"
        );
    }

    pub fn log_no_candidate(&self, vm_id: &str, current_size: &str) {
        info!(
            event = "no_candidate",
            run_id = %self.run_id,
            vm_id = %vm_id,
            current_size = %current_size,
            "No available resize for virtual machine"
        );
    }

    pub fn log_resize_failed(&self, vm_id: &str, expected: &str, observed: &str) {
        warn!(
            event = "resize_failed",
            run_id = %self.run_id,
            vm_id = %vm_id,
            expected_size = %expected,
            observed_size = %observed,
            "Failed to change virtual machine size"
        );
    }

    pub fn log_provider_error(&self, vm_id: &str, operation: &str, error: &str) {
        warn!(
            event = "provider_error",
            run_id = %self.run_id,
            vm_id = %vm_id,
            operation = %operation,
            error = %error,
            "Provider call failed, continuing with next virtual machine"
        );
    }
}
