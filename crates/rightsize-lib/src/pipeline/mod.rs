//! Batch passes over every visible virtual machine
//!
//! - [`run_scan`] measures utilization and tags under-utilized VMs
//! - [`run_resize`] shrinks tagged VMs to the first compatible smaller size
//!
//! Both passes take the provider and a [`RunContext`] explicitly; nothing is
//! held in globals apart from the metrics registry.

mod resize;
mod scan;

pub use resize::{run_resize, ResizeSummary};
pub use scan::{run_scan, ScanSummary};

use crate::error::ProviderResult;
use crate::models::{SkuProfile, Subscription};
use crate::observability::{RightsizeMetrics, StructuredLogger};
use crate::provider::{Inventory, SizeCatalog};
use crate::utilization::{MetricWindow, ThresholdPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default tag key marking right-sizing candidates
pub const DEFAULT_TAG_KEY: &str = "candidate";

/// Default tag value marking right-sizing candidates
pub const DEFAULT_TAG_VALUE: &str = "right_size";

/// Tag written by the scan pass and consumed by the resize pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTag {
    pub key: String,
    pub value: String,
}

impl Default for CandidateTag {
    fn default() -> Self {
        Self {
            key: DEFAULT_TAG_KEY.to_string(),
            value: DEFAULT_TAG_VALUE.to_string(),
        }
    }
}

impl CandidateTag {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(self.key.clone(), self.value.clone())])
    }
}

/// Settings and handles shared by one pass
#[derive(Clone)]
pub struct RunContext {
    pub window: MetricWindow,
    pub policy: ThresholdPolicy,
    pub tag: CandidateTag,
    /// Evaluate and report without tagging or resizing
    pub dry_run: bool,
    /// Restrict the pass to these subscription ids (empty means all)
    pub subscriptions: Vec<String>,
    pub metrics: RightsizeMetrics,
    pub logger: StructuredLogger,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            window: MetricWindow::default(),
            policy: ThresholdPolicy::default(),
            tag: CandidateTag::default(),
            dry_run: false,
            subscriptions: Vec::new(),
            metrics: RightsizeMetrics::new(),
            logger: StructuredLogger::new(run_id),
        }
    }

    pub fn with_window(mut self, window: MetricWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tag(mut self, tag: CandidateTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_subscriptions(mut self, subscriptions: Vec<String>) -> Self {
        self.subscriptions = subscriptions;
        self
    }
}

/// Subscriptions the pass should visit, honoring the context filter
async fn selected_subscriptions<P>(provider: &P, ctx: &RunContext) -> ProviderResult<Vec<Subscription>>
where
    P: Inventory + ?Sized,
{
    let all = provider.list_subscriptions().await?;
    if ctx.subscriptions.is_empty() {
        return Ok(all);
    }

    Ok(all
        .into_iter()
        .filter(|s| {
            ctx.subscriptions
                .iter()
                .any(|id| id.eq_ignore_ascii_case(&s.subscription_id))
        })
        .collect())
}

/// Location size catalogs fetched during a pass
#[derive(Default)]
struct CatalogCache {
    entries: HashMap<(String, String), Vec<SkuProfile>>,
}

impl CatalogCache {
    async fn get<P>(
        &mut self,
        provider: &P,
        subscription_id: &str,
        location: &str,
    ) -> ProviderResult<&[SkuProfile]>
    where
        P: SizeCatalog + ?Sized,
    {
        let key = (subscription_id.to_string(), location.to_string());
        if !self.entries.contains_key(&key) {
            let sizes = provider
                .list_location_sizes(subscription_id, location)
                .await?;
            self.entries.insert(key.clone(), sizes);
        }

        Ok(self
            .entries
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared inventory for pipeline tests

    use crate::provider::InventoryProvider;

    pub const WEB: &str =
        "/subscriptions/sub-1/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/web";
    pub const BUSY: &str =
        "/subscriptions/sub-1/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/busy";
    pub const SPOT: &str =
        "/subscriptions/sub-1/resourceGroups/rg-batch/providers/Microsoft.Compute/virtualMachines/spot";
    pub const IMAGE: &str =
        "/subscriptions/sub-1/resourceGroups/rg-img/providers/Microsoft.Compute/virtualMachines/image";
    pub const TINY: &str =
        "/subscriptions/sub-2/resourceGroups/rg-dev/providers/Microsoft.Compute/virtualMachines/tiny";
    pub const STUCK: &str =
        "/subscriptions/sub-2/resourceGroups/rg-dev/providers/Microsoft.Compute/virtualMachines/stuck";

    pub fn provider() -> InventoryProvider {
        provider_from(inventory())
    }

    pub fn provider_from(inventory: serde_json::Value) -> InventoryProvider {
        InventoryProvider::from_json(&inventory.to_string()).unwrap()
    }

    /// Two subscriptions; tests flip fault flags on this before building a provider
    pub fn inventory() -> serde_json::Value {
        serde_json::json!({
            "subscriptions": [{
                "subscription_id": "sub-1",
                "display_name": "Production",
                "location_sizes": {
                    "westeurope": [
                        {"name": "Standard_E2s_v3", "cores": 2, "memory_mb": 16384},
                        {"name": "Standard_D2s_v3", "cores": 2, "memory_mb": 8192},
                        {"name": "Standard_D4s_v3", "cores": 4, "memory_mb": 16384},
                        {"name": "Standard_D8s_v3", "cores": 8, "memory_mb": 32768}
                    ]
                },
                "virtual_machines": [{
                    "id": WEB,
                    "name": "web",
                    "location": "westeurope",
                    "vm_size": "Standard_D4s_v3",
                    "cpu": [
                        {"average": 5.0, "maximum": 20.0},
                        {"average": 7.0, "maximum": 35.0}
                    ],
                    "available_memory": [
                        {"average": 4000000000.0, "maximum": 6000000000.0}
                    ]
                }, {
                    "id": BUSY,
                    "name": "busy",
                    "location": "westeurope",
                    "vm_size": "Standard_D8s_v3",
                    "cpu": [{"average": 70.0, "maximum": 95.0}],
                    "available_memory": [{"average": 1000000000.0, "maximum": 2000000000.0}]
                }, {
                    "id": SPOT,
                    "name": "spot",
                    "location": "westeurope",
                    "vm_size": "Standard_D4s_v3",
                    "tag_conflict": true,
                    "cpu": [{"average": 1.0, "maximum": 3.0}],
                    "available_memory": [{"average": 1000000000.0, "maximum": 1000000000.0}]
                }, {
                    "id": IMAGE,
                    "name": "image",
                    "location": "westeurope",
                    "vm_size": "Standard_D4s_v3",
                    "generalized": true
                }]
            }, {
                "subscription_id": "sub-2",
                "display_name": "Development",
                "location_sizes": {
                    "northeurope": [
                        {"name": "Standard_B1s", "cores": 1, "memory_mb": 1024},
                        {"name": "Standard_E4_v3", "cores": 4, "memory_mb": 32768},
                        {"name": "Standard_E8_v3", "cores": 8, "memory_mb": 65536}
                    ]
                },
                "virtual_machines": [{
                    "id": TINY,
                    "name": "tiny",
                    "location": "northeurope",
                    "vm_size": "Standard_B1s",
                    "tags": {"candidate": "right_size"}
                }, {
                    "id": STUCK,
                    "name": "stuck",
                    "location": "northeurope",
                    "vm_size": "Standard_E8_v3",
                    "resize_ignored": true,
                    "tags": {"candidate": "right_size"}
                }]
            }]
        })
    }
}
