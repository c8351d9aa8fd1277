//! Resize command

use anyhow::Result;
use rightsize_lib::provider::CloudProvider;
use rightsize_lib::{run_resize, CsvSink, ResizeRow, ResizeSummary, RunContext};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{
    color_outcome, print_info, print_json, print_success, print_table, print_warning, short_name,
    OutputFormat,
};

/// Row for the resize results table
#[derive(Tabled)]
struct ResizeTableRow {
    #[tabled(rename = "VM")]
    name: String,
    #[tabled(rename = "Resource Group")]
    resource_group: String,
    #[tabled(rename = "Previous")]
    previous_size: String,
    #[tabled(rename = "Current")]
    current_size: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

#[derive(Serialize)]
struct ResizeReport<'a> {
    summary: &'a ResizeSummary,
    output: &'a Path,
    rows: &'a [ResizeRow],
}

/// Resize tagged VMs, append results to `output` and print them
pub async fn resize(
    provider: &dyn CloudProvider,
    ctx: &RunContext,
    output: &Path,
    format: OutputFormat,
) -> Result<ResizeSummary> {
    let mut sink = (CsvSink::append(output)?, Vec::<ResizeRow>::new());
    let summary = run_resize(provider, ctx, &mut sink).await?;
    let rows = sink.1;

    match format {
        OutputFormat::Json => print_json(&ResizeReport {
            summary: &summary,
            output,
            rows: &rows,
        })?,
        OutputFormat::Table => {
            if ctx.dry_run {
                print_info("Dry run: no virtual machines were resized");
            }

            let table_rows: Vec<ResizeTableRow> = rows
                .iter()
                .map(|r| ResizeTableRow {
                    name: short_name(&r.resource_id).to_string(),
                    resource_group: r.resource_group.clone().unwrap_or_else(|| "-".to_string()),
                    previous_size: r.previous_size.clone().unwrap_or_else(|| "-".to_string()),
                    current_size: r.current_size.clone(),
                    outcome: color_outcome(r.outcome),
                })
                .collect();
            print_table(
                table_rows,
                &format!("No virtual machines tagged {}={}", ctx.tag.key, ctx.tag.value),
            );

            println!(
                "\nResized: {}  Planned: {}  No candidate: {}  Failed: {}  Unverified: {}",
                summary.resized,
                summary.planned,
                summary.no_candidate,
                summary.failed,
                summary.unverified
            );
            if summary.failed > 0 || summary.errors > 0 {
                print_warning(&format!(
                    "{} failed resizes and {} provider errors, see logs",
                    summary.failed, summary.errors
                ));
            }
            if summary.unverified > 0 {
                print_warning(&format!(
                    "{} resizes were accepted but could not be read back",
                    summary.unverified
                ));
            }
            print_success(&format!("Results appended to {}", output.display()));
        }
    }

    Ok(summary)
}
