//! Resize pass over tagged candidates

use super::{selected_subscriptions, CatalogCache, RunContext};
use crate::error::ProviderResult;
use crate::export::{format_tags, ResizeRow, RowSink};
use crate::models::{ResizeOutcome, Subscription, VirtualMachine};
use crate::provider::CloudProvider;
use crate::sku::{find_profile, SizeMatcher};
use anyhow::{Context, Result};
use serde::Serialize;

/// Counts for one resize pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResizeSummary {
    pub evaluated: usize,
    pub skipped: usize,
    pub resized: usize,
    pub planned: usize,
    pub no_candidate: usize,
    pub failed: usize,
    pub unverified: usize,
    pub errors: usize,
}

/// Resize every VM carrying the candidate tag to its right size.
///
/// Each resize is verified by re-reading the VM; a size that did not change
/// is reported as [`ResizeOutcome::Failed`], and a VM that cannot be read
/// back after an accepted resize as [`ResizeOutcome::Unverified`].
pub async fn run_resize<P>(
    provider: &P,
    ctx: &RunContext,
    sink: &mut dyn RowSink<ResizeRow>,
) -> Result<ResizeSummary>
where
    P: CloudProvider + ?Sized,
{
    ctx.logger.log_run_started("resize", ctx.dry_run);

    let matcher = SizeMatcher::new();
    let mut summary = ResizeSummary::default();
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

        let tagged = vms
            .into_iter()
            .filter(|vm| vm.has_tag(&ctx.tag.key, &ctx.tag.value));

        for vm in tagged {
            match resize_vm(provider, ctx, &matcher, &mut catalogs, &sub, &vm).await {
                Ok(None) => {
                    ctx.metrics.inc_vms_skipped();
                    summary.skipped += 1;
                }
                Ok(Some(row)) => {
                    sink.record(&row)?;
                    ctx.metrics.inc_vms_evaluated();
                    summary.evaluated += 1;
                    match row.outcome {
                        ResizeOutcome::Resized => {
                            ctx.metrics.inc_vms_resized();
                            summary.resized += 1;
                        }
                        ResizeOutcome::Planned => summary.planned += 1,
                        ResizeOutcome::NoCandidate => {
                            ctx.metrics.inc_no_candidate();
                            summary.no_candidate += 1;
                        }
                        ResizeOutcome::Failed => {
                            ctx.metrics.inc_resize_failures();
                            summary.failed += 1;
                        }
                        ResizeOutcome::Unverified => summary.unverified += 1,
                    }
                }
                Err(e) => {
                    ctx.logger.log_provider_error(&vm.id, "resize", &e.to_string());
                    ctx.metrics.inc_provider_errors();
                    summary.errors += 1;
                }
            }
        }
    }

    sink.flush()?;
    ctx.logger
        .log_run_finished("resize", summary.evaluated, summary.resized, summary.errors);
    Ok(summary)
}

async fn resize_vm<P>(
    provider: &P,
    ctx: &RunContext,
    matcher: &SizeMatcher,
    catalogs: &mut CatalogCache,
    sub: &Subscription,
    vm: &VirtualMachine,
) -> ProviderResult<Option<ResizeRow>>
where
    P: CloudProvider + ?Sized,
{
    let catalog = catalogs.get(provider, &vm.subscription_id, &vm.location).await?;
    let current = match find_profile(catalog, &vm.vm_size) {
        Some(profile) => profile.clone(),
        None => {
            ctx.logger
                .log_vm_skipped(&vm.id, "size not in location catalog");
            return Ok(None);
        }
    };

    let available = provider.list_available_sizes(vm).await?;
    let chosen = match matcher.decide(&current, &available).chosen {
        Some(chosen) => chosen,
        None => {
            ctx.logger.log_no_candidate(&vm.id, &vm.vm_size);
            return Ok(Some(ResizeRow {
                subscription_name: None,
                resource_group: None,
                location: None,
                resource_id: vm.id.clone(),
                previous_size: None,
                current_size: vm.vm_size.clone(),
                tags: None,
                outcome: ResizeOutcome::NoCandidate,
            }));
        }
    };

    if ctx.dry_run {
        ctx.logger
            .log_resize_planned(&vm.id, &vm.vm_size, &chosen.name);
        return Ok(Some(ResizeRow {
            subscription_name: Some(sub.display_name.clone()),
            resource_group: vm.resource_group().map(str::to_string),
            location: Some(vm.location.clone()),
            resource_id: vm.id.clone(),
            previous_size: Some(vm.vm_size.clone()),
            current_size: chosen.name,
            tags: Some(format_tags(&vm.tags)),
            outcome: ResizeOutcome::Planned,
        }));
    }

    provider.resize(vm, &chosen.name).await?;
    let refreshed = match provider.get_virtual_machine(&vm.id).await {
        Ok(refreshed) => refreshed,
        Err(e) => {
            ctx.logger
                .log_provider_error(&vm.id, "verify_resize", &e.to_string());
            ctx.metrics.inc_provider_errors();
            return Ok(Some(ResizeRow {
                subscription_name: Some(sub.display_name.clone()),
                resource_group: vm.resource_group().map(str::to_string),
                location: Some(vm.location.clone()),
                resource_id: vm.id.clone(),
                previous_size: Some(vm.vm_size.clone()),
                current_size: chosen.name,
                tags: Some(format_tags(&vm.tags)),
                outcome: ResizeOutcome::Unverified,
            }));
        }
    };

    let outcome = if refreshed.vm_size == chosen.name {
        ctx.logger.log_resized(&vm.id, &vm.vm_size, &refreshed.vm_size);
        ResizeOutcome::Resized
    } else {
        ctx.logger
            .log_resize_failed(&vm.id, &chosen.name, &refreshed.vm_size);
        ResizeOutcome::Failed
    };

    Ok(Some(ResizeRow {
        subscription_name: Some(sub.display_name.clone()),
        resource_group: refreshed.resource_group().map(str::to_string),
        location: Some(refreshed.location.clone()),
        resource_id: refreshed.id.clone(),
        previous_size: Some(vm.vm_size.clone()),
        current_size: refreshed.vm_size.clone(),
        tags: Some(format_tags(&refreshed.tags)),
        outcome,
    }))
}
