//! Configuration management for the CLI
//!
//! Sources, lowest precedence first: built-in defaults, the config file
//! (`--config` or `~/.config/rightsizer/config.toml`), `RIGHTSIZER_*`
//! environment variables. Command-line flags are applied by the caller.

use anyhow::{Context, Result};
use rightsize_lib::pipeline::{CandidateTag, DEFAULT_TAG_KEY, DEFAULT_TAG_VALUE};
use rightsize_lib::provider::{ArmClientConfig, DEFAULT_ARM_ENDPOINT};
use rightsize_lib::utilization::{
    MetricWindow, ThresholdPolicy, DEFAULT_INTERVAL, DEFAULT_LOOKBACK_DAYS,
    DEFAULT_THRESHOLD_PERCENT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "RIGHTSIZER";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Azure Resource Manager endpoint
    #[serde(default = "default_arm_endpoint")]
    pub arm_endpoint: String,

    /// Pre-acquired bearer token for the management plane
    #[serde(default)]
    pub access_token: Option<String>,

    /// Subscription ids to visit (empty means every visible subscription)
    #[serde(default)]
    pub subscriptions: Vec<String>,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: u64,

    /// ISO 8601 metric granularity
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default = "default_threshold")]
    pub cpu_threshold_percent: f64,

    #[serde(default = "default_threshold")]
    pub memory_threshold_percent: f64,

    #[serde(default = "default_tag_key")]
    pub tag_key: String,

    #[serde(default = "default_tag_value")]
    pub tag_value: String,

    /// CSV file appended by `scan`
    #[serde(default = "default_utilization_output")]
    pub utilization_output: PathBuf,

    /// CSV file appended by `resize`
    #[serde(default = "default_resize_output")]
    pub resize_output: PathBuf,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_arm_endpoint() -> String {
    DEFAULT_ARM_ENDPOINT.to_string()
}

fn default_lookback_days() -> u64 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_interval() -> String {
    DEFAULT_INTERVAL.to_string()
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD_PERCENT
}

fn default_tag_key() -> String {
    DEFAULT_TAG_KEY.to_string()
}

fn default_tag_value() -> String {
    DEFAULT_TAG_VALUE.to_string()
}

fn default_utilization_output() -> PathBuf {
    PathBuf::from("vm_utilization.csv")
}

fn default_resize_output() -> PathBuf {
    PathBuf::from("vm_resize.csv")
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arm_endpoint: default_arm_endpoint(),
            access_token: None,
            subscriptions: Vec::new(),
            lookback_days: default_lookback_days(),
            interval: default_interval(),
            cpu_threshold_percent: default_threshold(),
            memory_threshold_percent: default_threshold(),
            tag_key: default_tag_key(),
            tag_value: default_tag_value(),
            utilization_output: default_utilization_output(),
            resize_output: default_resize_output(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("subscriptions"),
            )
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("rightsizer").join("config.toml"))
    }

    pub fn window(&self) -> MetricWindow {
        MetricWindow::last_days(self.lookback_days).with_interval(self.interval.clone())
    }

    pub fn policy(&self) -> ThresholdPolicy {
        ThresholdPolicy {
            cpu_percent: self.cpu_threshold_percent,
            memory_percent: self.memory_threshold_percent,
        }
    }

    pub fn tag(&self) -> CandidateTag {
        CandidateTag {
            key: self.tag_key.clone(),
            value: self.tag_value.clone(),
        }
    }

    /// ARM client settings, failing when no token is configured
    pub fn arm_client_config(&self) -> Result<ArmClientConfig> {
        let access_token = self
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("No access token configured; set RIGHTSIZER_ACCESS_TOKEN or pass --inventory")?;

        Ok(ArmClientConfig {
            endpoint: self.arm_endpoint.clone(),
            access_token,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            ..ArmClientConfig::default()
        })
    }
}
