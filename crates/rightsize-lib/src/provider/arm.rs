//! Azure Resource Manager REST provider
//!
//! This module provides a client that:
//! - Authenticates every request with a pre-acquired bearer token
//! - Follows `nextLink` paging on list operations
//! - Maps HTTP statuses onto [`ProviderError`]
//! - Retries throttled and transient failures with exponential backoff

use super::{Inventory, MetricsProvider, ResourceManager, SizeCatalog, GENERALIZED_STATUS};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{MetricPoint, SkuProfile, Subscription, VirtualMachine};
use crate::observability::RightsizeMetrics;
use crate::utilization::{MetricKind, MetricWindow};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Public Azure management endpoint
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com/";

const SUBSCRIPTIONS_API_VERSION: &str = "2020-01-01";
const COMPUTE_API_VERSION: &str = "2023-03-01";
const MONITOR_API_VERSION: &str = "2018-01-01";
const TAGS_API_VERSION: &str = "2021-04-01";

const METRIC_AGGREGATION: &str = "Average,Maximum";

/// Configuration for the ARM client
#[derive(Debug, Clone)]
pub struct ArmClientConfig {
    /// Management endpoint (e.g., "https://management.azure.com/")
    pub endpoint: String,
    /// Bearer token for the management API
    pub access_token: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,
    /// Initial backoff between retries
    pub initial_backoff: Duration,
    /// Maximum backoff between retries
    pub max_backoff: Duration,
}

impl Default for ArmClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ARM_ENDPOINT.to_string(),
            access_token: String::new(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Client for the Azure Resource Manager API
pub struct ArmClient {
    client: Client,
    base_url: Url,
    config: ArmClientConfig,
    metrics: RightsizeMetrics,
}

impl ArmClient {
    pub fn new(config: ArmClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut endpoint = config.endpoint.clone();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let base_url = Url::parse(&endpoint).context("Invalid ARM endpoint URL")?;

        Ok(Self {
            client,
            base_url,
            config,
            metrics: RightsizeMetrics::new(),
        })
    }

    pub fn builder() -> ArmClientBuilder {
        ArmClientBuilder::new()
    }

    pub fn endpoint(&self) -> &str {
        self.base_url.as_str()
    }

    fn url(&self, path: &str, api_version: &str) -> ProviderResult<Url> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ProviderError::InvalidRequest(format!("{}: {}", path, e)))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    /// Send a request, retrying retryable failures with exponential backoff
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        resource: &str,
    ) -> ProviderResult<Response> {
        let mut attempt = 0;
        let mut backoff = self.config.initial_backoff;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&self.config.access_token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let started = Instant::now();
            let outcome = request.send().await;
            self.metrics
                .observe_request_latency(started.elapsed().as_secs_f64());

            let error = match outcome {
                Ok(response) if response.status().is_success() => {
                    debug!(method = %method, resource = %resource, "ARM request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    ProviderError::from_status(status, resource, body)
                }
                Err(e) => ProviderError::from(e),
            };

            if !error.is_retryable() || attempt >= self.config.max_retries {
                return Err(error);
            }

            attempt += 1;
            warn!(
                method = %method,
                resource = %resource,
                attempt = attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Retrying ARM request"
            );
            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, self.config.max_backoff);
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, resource: &str) -> ProviderResult<T> {
        let response = self.send(Method::GET, url, None, resource).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("{}: {}", resource, e)))
    }

    /// GET a list operation and follow `nextLink` until exhausted
    async fn get_paged<T: DeserializeOwned>(
        &self,
        url: Url,
        resource: &str,
    ) -> ProviderResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get_json(url, resource).await?;
            items.extend(page.value);
            next = match page.next_link.filter(|link| !link.is_empty()) {
                Some(link) => Some(
                    Url::parse(&link)
                        .map_err(|e| ProviderError::Decode(format!("invalid nextLink: {}", e)))?,
                ),
                None => None,
            };
        }

        Ok(items)
    }

    async fn patch(&self, url: Url, body: serde_json::Value, resource: &str) -> ProviderResult<()> {
        self.send(Method::PATCH, url, Some(&body), resource).await?;
        Ok(())
    }
}

#[async_trait]
impl Inventory for ArmClient {
    async fn list_subscriptions(&self) -> ProviderResult<Vec<Subscription>> {
        let url = self.url("/subscriptions", SUBSCRIPTIONS_API_VERSION)?;
        let subscriptions: Vec<ArmSubscription> = self.get_paged(url, "subscriptions").await?;

        Ok(subscriptions
            .into_iter()
            .map(|s| Subscription {
                display_name: s.display_name.unwrap_or_else(|| s.subscription_id.clone()),
                subscription_id: s.subscription_id,
            })
            .collect())
    }

    async fn list_virtual_machines(
        &self,
        subscription_id: &str,
    ) -> ProviderResult<Vec<VirtualMachine>> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Compute/virtualMachines",
            subscription_id
        );
        let url = self.url(&path, COMPUTE_API_VERSION)?;
        let vms: Vec<ArmVirtualMachine> = self.get_paged(url, &path).await?;

        Ok(vms
            .into_iter()
            .map(|vm| vm.into_model(subscription_id))
            .collect())
    }

    async fn get_virtual_machine(&self, vm_id: &str) -> ProviderResult<VirtualMachine> {
        let url = self.url(vm_id, COMPUTE_API_VERSION)?;
        let vm: ArmVirtualMachine = self.get_json(url, vm_id).await?;
        let subscription_id = vm_id.split('/').nth(2).unwrap_or_default().to_string();
        Ok(vm.into_model(&subscription_id))
    }

    async fn is_generalized(&self, vm: &VirtualMachine) -> ProviderResult<bool> {
        let path = format!("{}/instanceView", vm.id);
        let url = self.url(&path, COMPUTE_API_VERSION)?;
        let view: ArmInstanceView = self.get_json(url, &path).await?;

        Ok(view
            .statuses
            .first()
            .and_then(|s| s.code.as_deref())
            .map(|code| code == GENERALIZED_STATUS)
            .unwrap_or(false))
    }
}

#[async_trait]
impl MetricsProvider for ArmClient {
    async fn fetch_metric(
        &self,
        resource_id: &str,
        kind: MetricKind,
        window: &MetricWindow,
    ) -> ProviderResult<Vec<MetricPoint>> {
        let path = format!("{}/providers/Microsoft.Insights/metrics", resource_id);
        let mut url = self.url(&path, MONITOR_API_VERSION)?;
        url.query_pairs_mut()
            .append_pair("timespan", &window.timespan())
            .append_pair("interval", &window.interval)
            .append_pair("metricnames", kind.metric_name())
            .append_pair("aggregation", METRIC_AGGREGATION);

        let response: ArmMetricsResponse = self.get_json(url, &path).await?;

        Ok(response
            .value
            .into_iter()
            .flat_map(|metric| metric.timeseries)
            .flat_map(|series| series.data)
            .map(|data| MetricPoint {
                timestamp: data.time_stamp,
                average: data.average,
                maximum: data.maximum,
            })
            .collect())
    }
}

#[async_trait]
impl SizeCatalog for ArmClient {
    async fn list_location_sizes(
        &self,
        subscription_id: &str,
        location: &str,
    ) -> ProviderResult<Vec<SkuProfile>> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Compute/locations/{}/vmSizes",
            subscription_id, location
        );
        let url = self.url(&path, COMPUTE_API_VERSION)?;
        let sizes: Vec<ArmVmSize> = self.get_paged(url, &path).await?;
        Ok(sizes.into_iter().map(SkuProfile::from).collect())
    }

    async fn list_available_sizes(&self, vm: &VirtualMachine) -> ProviderResult<Vec<SkuProfile>> {
        let path = format!("{}/vmSizes", vm.id);
        let url = self.url(&path, COMPUTE_API_VERSION)?;
        let sizes: Vec<ArmVmSize> = self.get_paged(url, &path).await?;
        Ok(sizes.into_iter().map(SkuProfile::from).collect())
    }
}

#[async_trait]
impl ResourceManager for ArmClient {
    async fn merge_tags(
        &self,
        resource_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        let path = format!("{}/providers/Microsoft.Resources/tags/default", resource_id);
        let url = self.url(&path, TAGS_API_VERSION)?;
        let body = json!({
            "operation": "Merge",
            "properties": { "tags": tags },
        });
        self.patch(url, body, resource_id).await
    }

    async fn resize(&self, vm: &VirtualMachine, vm_size: &str) -> ProviderResult<()> {
        let url = self.url(&vm.id, COMPUTE_API_VERSION)?;
        let body = json!({
            "location": vm.location,
            "properties": { "hardwareProfile": { "vmSize": vm_size } },
        });
        self.patch(url, body, &vm.id).await
    }
}

/// Builder for ArmClient
pub struct ArmClientBuilder {
    config: ArmClientConfig,
}

impl ArmClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ArmClientConfig::default(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = token.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.config.initial_backoff = backoff;
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.config.max_backoff = backoff;
        self
    }

    pub fn build(self) -> Result<ArmClient> {
        ArmClient::new(self.config)
    }
}

impl Default for ArmClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ARM wire types

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default, rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmSubscription {
    subscription_id: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmVirtualMachine {
    id: String,
    name: String,
    location: String,
    #[serde(default)]
    tags: Option<BTreeMap<String, String>>,
    properties: ArmVmProperties,
}

impl ArmVirtualMachine {
    fn into_model(self, subscription_id: &str) -> VirtualMachine {
        VirtualMachine {
            id: self.id,
            name: self.name,
            subscription_id: subscription_id.to_string(),
            location: self.location,
            vm_size: self.properties.hardware_profile.vm_size,
            tags: self.tags.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmVmProperties {
    hardware_profile: ArmHardwareProfile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmHardwareProfile {
    vm_size: String,
}

#[derive(Debug, Deserialize)]
struct ArmInstanceView {
    #[serde(default)]
    statuses: Vec<ArmStatus>,
}

#[derive(Debug, Deserialize)]
struct ArmStatus {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmVmSize {
    name: String,
    number_of_cores: u32,
    #[serde(rename = "memoryInMB")]
    memory_in_mb: u64,
}

impl From<ArmVmSize> for SkuProfile {
    fn from(size: ArmVmSize) -> Self {
        SkuProfile::new(size.name, size.number_of_cores, size.memory_in_mb)
    }
}

#[derive(Debug, Deserialize)]
struct ArmMetricsResponse {
    #[serde(default)]
    value: Vec<ArmMetric>,
}

#[derive(Debug, Deserialize)]
struct ArmMetric {
    #[serde(default)]
    timeseries: Vec<ArmTimeSeries>,
}

#[derive(Debug, Deserialize)]
struct ArmTimeSeries {
    #[serde(default)]
    data: Vec<ArmMetricValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmMetricValue {
    #[serde(default)]
    time_stamp: Option<String>,
    #[serde(default)]
    average: Option<f64>,
    #[serde(default)]
    maximum: Option<f64>,
}
