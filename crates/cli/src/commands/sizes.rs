//! Size catalog commands

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use rightsize_lib::provider::CloudProvider;
use rightsize_lib::sku::find_profile;
use rightsize_lib::{SizeMatcher, SkuProfile};
use std::path::Path;
use tabled::Tabled;

use crate::output::{format_memory_mb, print_json, print_table, print_warning, OutputFormat};

/// Row for the size catalog table
#[derive(Tabled)]
struct SizeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Cores")]
    cores: u32,
    #[tabled(rename = "Memory")]
    memory: String,
}

impl From<&SkuProfile> for SizeRow {
    fn from(sku: &SkuProfile) -> Self {
        Self {
            name: sku.name.clone(),
            cores: sku.cores,
            memory: format_memory_mb(sku.memory_mb),
        }
    }
}

/// Load a JSON array of size profiles
pub fn load_catalog(path: &Path) -> Result<Vec<SkuProfile>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog {}", path.display()))
}

/// Pick the right size for `current` from a local catalog
pub fn match_size(current: &str, catalog_path: &Path, format: OutputFormat) -> Result<()> {
    let catalog = load_catalog(catalog_path)?;
    let profile = find_profile(&catalog, current)
        .cloned()
        .ok_or_else(|| anyhow!("Size {} not found in {}", current, catalog_path.display()))?;

    let decision = SizeMatcher::new().decide(&profile, &catalog);

    match format {
        OutputFormat::Json => print_json(&decision)?,
        OutputFormat::Table => {
            let mut rows = vec![SizeRow::from(&decision.current)];
            match &decision.chosen {
                Some(chosen) => {
                    rows.push(SizeRow::from(chosen));
                    print_table(rows, "");
                    println!(
                        "\n{} {} {}",
                        decision.current.name,
                        "→".bold(),
                        chosen.name.green()
                    );
                }
                None => {
                    print_table(rows, "");
                    print_warning(&format!("No available resize for {}", decision.current.name));
                }
            }
        }
    }

    Ok(())
}

/// List the sizes offered in a location
pub async fn list_sizes(
    provider: &dyn CloudProvider,
    subscription: Option<String>,
    location: &str,
    format: OutputFormat,
) -> Result<()> {
    let subscription_id = match subscription {
        Some(id) => id,
        None => provider
            .list_subscriptions()
            .await?
            .into_iter()
            .next()
            .map(|s| s.subscription_id)
            .ok_or_else(|| anyhow!("No subscriptions visible; pass --subscription"))?,
    };

    let sizes = provider
        .list_location_sizes(&subscription_id, location)
        .await
        .with_context(|| format!("Failed to list sizes for {}", location))?;

    match format {
        OutputFormat::Json => print_json(&sizes)?,
        OutputFormat::Table => {
            let rows: Vec<SizeRow> = sizes.iter().map(SizeRow::from).collect();
            print_table(rows, &format!("No sizes found in {}", location));
            if !sizes.is_empty() {
                println!("\nTotal: {} sizes", sizes.len());
            }
        }
    }

    Ok(())
}
