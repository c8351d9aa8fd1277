//! Utilization scan and candidate tagging

use super::{selected_subscriptions, CatalogCache, RunContext};
use crate::error::ProviderResult;
use crate::export::{RowSink, UtilizationRow};
use crate::models::{ThresholdFlag, VirtualMachine};
use crate::provider::CloudProvider;
use crate::sku::find_profile;
use crate::utilization::{MetricKind, UtilizationReport};
use anyhow::{Context, Result};
use serde::Serialize;

/// Counts for one scan pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub evaluated: usize,
    pub skipped: usize,
    pub candidates: usize,
    pub tagged: usize,
    pub conflicts: usize,
    pub errors: usize,
}

enum TagResult {
    NotCandidate,
    Tagged,
    Planned,
    Conflict,
}

impl TagResult {
    fn flag(&self) -> ThresholdFlag {
        match self {
            TagResult::NotCandidate => ThresholdFlag::False,
            TagResult::Tagged | TagResult::Planned => ThresholdFlag::True,
            TagResult::Conflict => ThresholdFlag::Spot,
        }
    }
}

enum VmScan {
    Skipped(&'static str),
    Measured(UtilizationRow, TagResult),
}

/// Measure every VM, tag under-utilized ones and record a row per VM.
///
/// Provider failures for a single VM are logged and counted; only failing
/// to list subscriptions or to write a row aborts the pass.
pub async fn run_scan<P>(
    provider: &P,
    ctx: &RunContext,
    sink: &mut dyn RowSink<UtilizationRow>,
) -> Result<ScanSummary>
where
    P: CloudProvider + ?Sized,
{
    ctx.logger.log_run_started("scan", ctx.dry_run);

    let mut summary = ScanSummary::default();
    let mut catalogs = CatalogCache::default();

    let subscriptions = selected_subscriptions(provider, ctx)
        .await
        .context("Failed to list subscriptions")?;

    for sub in subscriptions {
        let vms = match provider.list_virtual_machines(&sub.subscription_id).await {
            Ok(vms) => vms,
            Err(e) => {
                ctx.logger
                    .log_provider_error(&sub.subscription_id, "list_virtual_machines", &e.to_string());
                ctx.metrics.inc_provider_errors();
                summary.errors += 1;
                continue;
            }
        };

        for vm in vms {
            match scan_vm(provider, ctx, &mut catalogs, &vm).await {
                Ok(VmScan::Skipped(reason)) => {
                    ctx.logger.log_vm_skipped(&vm.id, reason);
                    ctx.metrics.inc_vms_skipped();
                    summary.skipped += 1;
                }
                Ok(VmScan::Measured(row, result)) => {
                    sink.record(&row)?;
                    ctx.metrics.inc_vms_evaluated();
                    summary.evaluated += 1;
                    match result {
                        TagResult::NotCandidate => {}
                        TagResult::Planned => summary.candidates += 1,
                        TagResult::Tagged => {
                            ctx.metrics.inc_candidates_tagged();
                            summary.candidates += 1;
                            summary.tagged += 1;
                        }
                        TagResult::Conflict => {
                            ctx.metrics.inc_tag_conflicts();
                            summary.candidates += 1;
                            summary.conflicts += 1;
                        }
                    }
                }
                Err(e) => {
                    ctx.logger.log_provider_error(&vm.id, "scan", &e.to_string());
                    ctx.metrics.inc_provider_errors();
                    summary.errors += 1;
                }
            }
        }
    }

    sink.flush()?;
    ctx.logger
        .log_run_finished("scan", summary.evaluated, summary.tagged, summary.errors);
    Ok(summary)
}

async fn scan_vm<P>(
    provider: &P,
    ctx: &RunContext,
    catalogs: &mut CatalogCache,
    vm: &VirtualMachine,
) -> ProviderResult<VmScan>
where
    P: CloudProvider + ?Sized,
{
    if provider.is_generalized(vm).await? {
        return Ok(VmScan::Skipped("generalized image"));
    }

    let catalog = catalogs.get(provider, &vm.subscription_id, &vm.location).await?;
    let sku = match find_profile(catalog, &vm.vm_size) {
        Some(sku) => sku.clone(),
        None => return Ok(VmScan::Skipped("size not in location catalog")),
    };

    let cpu = provider
        .fetch_metric(&vm.id, MetricKind::Cpu, &ctx.window)
        .await?;
    let memory = provider
        .fetch_metric(&vm.id, MetricKind::AvailableMemory, &ctx.window)
        .await?;

    let report = UtilizationReport::build(&vm.id, &sku, &cpu, &memory);
    let underutilized = ctx.policy.is_underutilized(&report);
    ctx.logger.log_utilization(
        &vm.id,
        &vm.vm_size,
        report.cpu_percent.maximum,
        report.memory_percent.maximum,
        underutilized,
    );

    let result = if !underutilized {
        TagResult::NotCandidate
    } else if ctx.dry_run {
        TagResult::Planned
    } else {
        match provider.merge_tags(&vm.id, &ctx.tag.to_map()).await {
            Ok(()) => {
                ctx.logger
                    .log_candidate_tagged(&vm.id, &ctx.tag.key, &ctx.tag.value);
                TagResult::Tagged
            }
            Err(e) if e.is_conflict() => {
                ctx.logger.log_tag_conflict(&vm.id, &e.to_string());
                TagResult::Conflict
            }
            Err(e) => return Err(e),
        }
    };

    let row = UtilizationRow {
        resource_id: vm.id.clone(),
        average_cpu: report.cpu_percent.average,
        maximum_cpu: report.cpu_percent.maximum,
        average_memory: report.memory_percent.average,
        maximum_memory: report.memory_percent.maximum,
        total_memory_mb: report.total_memory_mb,
        vm_size: vm.vm_size.clone(),
        region: vm.location.clone(),
        below_threshold: result.flag(),
    };

    Ok(VmScan::Measured(row, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::{self, BUSY, SPOT, WEB};
    use crate::provider::Inventory;

    #[tokio::test]
    async fn test_scan_tags_underutilized_vms() {
        let provider = fixtures::provider();
        let ctx = RunContext::new("test-scan");
        let mut rows: Vec<UtilizationRow> = Vec::new();

        let summary = run_scan(&provider, &ctx, &mut rows).await.unwrap();

        assert_eq!(summary.evaluated, 5);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.tagged, 3);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.errors, 0);

        let web = rows.iter().find(|r| r.resource_id == WEB).unwrap();
        assert_eq!(web.below_threshold, ThresholdFlag::True);
        assert_eq!(web.maximum_cpu, 35.0);
        assert!((web.average_cpu - 6.0).abs() < 1e-9);
        // 6 GB of 16384 MB
        assert!((web.maximum_memory - 6000.0 / 16384.0 * 100.0).abs() < 1e-9);
        assert_eq!(web.total_memory_mb, 16384);

        let tagged = provider.get_virtual_machine(WEB).await.unwrap();
        assert!(tagged.has_tag("candidate", "right_size"));
    }

    #[tokio::test]
    async fn test_scan_records_conflict_as_spot() {
        let provider = fixtures::provider();
        let ctx = RunContext::new("test-scan");
        let mut rows: Vec<UtilizationRow> = Vec::new();

        run_scan(&provider, &ctx, &mut rows).await.unwrap();

        let spot = rows.iter().find(|r| r.resource_id == SPOT).unwrap();
        assert_eq!(spot.below_threshold, ThresholdFlag::Spot);

        let busy = rows.iter().find(|r| r.resource_id == BUSY).unwrap();
        assert_eq!(busy.below_threshold, ThresholdFlag::False);
    }

    #[tokio::test]
    async fn test_scan_dry_run_leaves_tags_alone() {
        let provider = fixtures::provider();
        let ctx = RunContext::new("test-scan").with_dry_run(true);
        let mut rows: Vec<UtilizationRow> = Vec::new();

        let summary = run_scan(&provider, &ctx, &mut rows).await.unwrap();

        assert_eq!(summary.tagged, 0);
        assert_eq!(summary.candidates, 4);
        let web = provider.get_virtual_machine(WEB).await.unwrap();
        assert!(web.tags.is_empty());
        let spot = rows.iter().find(|r| r.resource_id == SPOT).unwrap();
        assert_eq!(spot.below_threshold, ThresholdFlag::True);
    }

    #[tokio::test]
    async fn test_scan_continues_past_failing_vms() {
        let mut inventory = fixtures::inventory();
        let vms = &mut inventory["subscriptions"][0]["virtual_machines"];
        vms[0]["tag_error"] = true.into();
        vms[1]["metrics_error"] = true.into();
        let provider = fixtures::provider_from(inventory);
        let ctx = RunContext::new("test-scan");
        let mut rows: Vec<UtilizationRow> = Vec::new();

        let summary = run_scan(&provider, &ctx, &mut rows).await.unwrap();

        assert_eq!(summary.errors, 2);
        assert_eq!(summary.evaluated, 3);
        assert_eq!(summary.tagged, 2);
        assert_eq!(summary.conflicts, 1);
        assert!(rows.iter().all(|r| r.resource_id != WEB && r.resource_id != BUSY));
        assert!(rows.iter().any(|r| r.resource_id == SPOT));

        let web = provider.get_virtual_machine(WEB).await.unwrap();
        assert!(web.tags.is_empty());
    }

    #[tokio::test]
    async fn test_scan_continues_past_unlistable_subscription() {
        let mut inventory = fixtures::inventory();
        inventory["subscriptions"][0]["list_error"] = true.into();
        let provider = fixtures::provider_from(inventory);
        let ctx = RunContext::new("test-scan");
        let mut rows: Vec<UtilizationRow> = Vec::new();

        let summary = run_scan(&provider, &ctx, &mut rows).await.unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.evaluated, 2);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.resource_id.starts_with("/subscriptions/sub-2/")));
    }

    #[tokio::test]
    async fn test_scan_subscription_filter() {
        let provider = fixtures::provider();
        let ctx = RunContext::new("test-scan").with_subscriptions(vec!["sub-2".to_string()]);
        let mut rows: Vec<UtilizationRow> = Vec::new();

        let summary = run_scan(&provider, &ctx, &mut rows).await.unwrap();

        assert_eq!(summary.evaluated, 2);
        assert!(rows.iter().all(|r| r.resource_id.starts_with("/subscriptions/sub-2/")));
    }
}
