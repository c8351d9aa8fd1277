//! VM Right-Sizer CLI
//!
//! Scans Azure virtual machines for low utilization, tags candidates and
//! resizes them to the next compatible smaller size.

mod commands;
mod config;
mod output;
mod provider;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{resize, scan, sizes};
use rightsize_lib::RunContext;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{LogFormat, OutputFormat};

/// VM Right-Sizer CLI
#[derive(Parser)]
#[command(name = "rightsizer")]
#[command(author, version, about = "Right-size under-utilized Azure virtual machines", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/rightsizer/config.toml)
    #[arg(long, global = true, env = "RIGHTSIZER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serve data from a JSON inventory snapshot instead of Azure; non-dry runs write changes back
    #[arg(long, global = true, env = "RIGHTSIZER_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Log record format
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Write Prometheus metrics to this file when the run ends
    #[arg(long, global = true)]
    pub metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by the scan and resize passes
#[derive(Args)]
pub struct PassArgs {
    /// CSV file to append results to
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Report without tagging or resizing
    #[arg(long)]
    pub dry_run: bool,

    /// Restrict the run to a subscription id (repeatable)
    #[arg(long = "subscription", value_name = "ID")]
    pub subscriptions: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Measure utilization and tag under-utilized virtual machines
    Scan(PassArgs),

    /// Resize tagged virtual machines to their right size
    Resize(PassArgs),

    /// Pick the right size for a VM size from a local catalog
    Match {
        /// Current size name
        #[arg(long)]
        current: String,

        /// JSON array of size profiles, in preference order
        #[arg(long)]
        catalog: PathBuf,
    },

    /// List the sizes offered in a location
    Sizes {
        /// Azure location, e.g. westeurope
        #[arg(long)]
        location: String,

        /// Subscription id (defaults to the first visible one)
        #[arg(long)]
        subscription: Option<String>,
    },
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (json, text) = match format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(std::io::stderr)), None),
        LogFormat::Text => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

fn run_context(config: &Config, args: &PassArgs) -> RunContext {
    let subscriptions = if args.subscriptions.is_empty() {
        config.subscriptions.clone()
    } else {
        args.subscriptions.clone()
    };

    RunContext::new(chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string())
        .with_window(config.window())
        .with_policy(config.policy())
        .with_tag(config.tag())
        .with_dry_run(args.dry_run)
        .with_subscriptions(subscriptions)
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    let metrics = match cli.command {
        Commands::Match { current, catalog } => {
            sizes::match_size(&current, &catalog, cli.format)?;
            None
        }
        Commands::Sizes {
            location,
            subscription,
        } => {
            let backend = provider::connect(cli.inventory.as_deref(), &config)?;
            let subscription = subscription.or_else(|| config.subscriptions.first().cloned());
            sizes::list_sizes(backend.provider(), subscription, &location, cli.format).await?;
            None
        }
        Commands::Scan(args) => {
            let backend = provider::connect(cli.inventory.as_deref(), &config)?;
            let ctx = run_context(&config, &args);
            let output = args.output.unwrap_or_else(|| config.utilization_output.clone());
            let summary = scan::scan(backend.provider(), &ctx, &output, cli.format).await?;
            info!(evaluated = summary.evaluated, tagged = summary.tagged, "Scan complete");
            if !ctx.dry_run {
                backend.persist().await?;
            }
            Some(ctx.metrics)
        }
        Commands::Resize(args) => {
            let backend = provider::connect(cli.inventory.as_deref(), &config)?;
            let ctx = run_context(&config, &args);
            let output = args.output.unwrap_or_else(|| config.resize_output.clone());
            let summary = resize::resize(backend.provider(), &ctx, &output, cli.format).await?;
            info!(resized = summary.resized, failed = summary.failed, "Resize complete");
            if !ctx.dry_run {
                backend.persist().await?;
            }
            Some(ctx.metrics)
        }
    };

    if let (Some(path), Some(metrics)) = (cli.metrics_file.as_deref(), metrics) {
        metrics.write_textfile(path)?;
        info!(path = %path.display(), "Wrote metrics");
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
