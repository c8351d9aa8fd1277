//! Utilization scan command

use anyhow::Result;
use colored::Colorize;
use rightsize_lib::provider::CloudProvider;
use rightsize_lib::{run_scan, CsvSink, RunContext, ScanSummary, UtilizationRow};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{
    color_flag, format_memory_mb, format_percent, print_info, print_json, print_success,
    print_table, print_warning, short_name, OutputFormat,
};

/// Row for the scan results table
#[derive(Tabled)]
struct ScanTableRow {
    #[tabled(rename = "VM")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Avg CPU")]
    average_cpu: String,
    #[tabled(rename = "Max CPU")]
    maximum_cpu: String,
    #[tabled(rename = "Max Mem")]
    maximum_memory: String,
    #[tabled(rename = "Memory")]
    total_memory: String,
    #[tabled(rename = "Below")]
    flag: String,
}

#[derive(Serialize)]
struct ScanReport<'a> {
    summary: &'a ScanSummary,
    output: &'a Path,
    rows: &'a [UtilizationRow],
}

/// Scan every VM, append results to `output` and print them
pub async fn scan(
    provider: &dyn CloudProvider,
    ctx: &RunContext,
    output: &Path,
    format: OutputFormat,
) -> Result<ScanSummary> {
    let mut sink = (CsvSink::append(output)?, Vec::<UtilizationRow>::new());
    let summary = run_scan(provider, ctx, &mut sink).await?;
    let rows = sink.1;

    match format {
        OutputFormat::Json => print_json(&ScanReport {
            summary: &summary,
            output,
            rows: &rows,
        })?,
        OutputFormat::Table => {
            if ctx.dry_run {
                print_info("Dry run: no tags were written");
            }

            let table_rows: Vec<ScanTableRow> = rows
                .iter()
                .map(|r| ScanTableRow {
                    name: short_name(&r.resource_id).to_string(),
                    size: r.vm_size.clone(),
                    region: r.region.clone(),
                    average_cpu: format_percent(r.average_cpu),
                    maximum_cpu: format_percent(r.maximum_cpu),
                    maximum_memory: format_percent(r.maximum_memory),
                    total_memory: format_memory_mb(r.total_memory_mb),
                    flag: color_flag(r.below_threshold),
                })
                .collect();
            print_table(table_rows, "No virtual machines evaluated");

            println!(
                "\nEvaluated: {}  Skipped: {}  Candidates: {}  Tagged: {}  Conflicts: {}",
                summary.evaluated,
                summary.skipped,
                summary.candidates.to_string().cyan(),
                summary.tagged,
                summary.conflicts
            );
            if summary.errors > 0 {
                print_warning(&format!("{} provider errors, see logs", summary.errors));
            }
            print_success(&format!("Results appended to {}", output.display()));
        }
    }

    Ok(summary)
}
