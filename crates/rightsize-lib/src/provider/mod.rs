//! Cloud provider collaborators
//!
//! The pipelines talk to the cloud only through these traits:
//! - [`Inventory`]: subscriptions and virtual machines
//! - [`MetricsProvider`]: utilization samples
//! - [`SizeCatalog`]: region size catalogs and legal resize targets
//! - [`ResourceManager`]: tag merges and resizes
//!
//! [`ArmClient`] implements them against the Azure Resource Manager REST
//! API; [`InventoryProvider`] implements them over a JSON snapshot.

mod arm;
mod inventory;

pub use arm::{ArmClient, ArmClientBuilder, ArmClientConfig, DEFAULT_ARM_ENDPOINT};
pub use inventory::{InventoryProvider, InventorySnapshot, SnapshotSubscription, SnapshotVm};

use crate::error::ProviderResult;
use crate::models::{MetricPoint, SkuProfile, Subscription, VirtualMachine};
use crate::utilization::{MetricKind, MetricWindow};
use std::collections::BTreeMap;

pub use async_trait::async_trait;

/// Instance-view status code of a generalized (captured image) VM
pub const GENERALIZED_STATUS: &str = "OSState/generalized";

#[async_trait]
pub trait Inventory: Send + Sync {
    async fn list_subscriptions(&self) -> ProviderResult<Vec<Subscription>>;

    async fn list_virtual_machines(&self, subscription_id: &str)
        -> ProviderResult<Vec<VirtualMachine>>;

    /// Fetch the current state of a single VM
    async fn get_virtual_machine(&self, vm_id: &str) -> ProviderResult<VirtualMachine>;

    /// Whether the VM's first instance-view status is [`GENERALIZED_STATUS`]
    async fn is_generalized(&self, vm: &VirtualMachine) -> ProviderResult<bool>;
}

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Samples for one metric over the window, in time order
    async fn fetch_metric(
        &self,
        resource_id: &str,
        kind: MetricKind,
        window: &MetricWindow,
    ) -> ProviderResult<Vec<MetricPoint>>;
}

#[async_trait]
pub trait SizeCatalog: Send + Sync {
    /// All sizes offered in a location
    async fn list_location_sizes(
        &self,
        subscription_id: &str,
        location: &str,
    ) -> ProviderResult<Vec<SkuProfile>>;

    /// Sizes the VM may be resized to, in provider order
    async fn list_available_sizes(&self, vm: &VirtualMachine) -> ProviderResult<Vec<SkuProfile>>;
}

#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Merge tags onto a resource, keeping existing ones
    async fn merge_tags(
        &self,
        resource_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()>;

    /// Change a VM's size in place
    async fn resize(&self, vm: &VirtualMachine, vm_size: &str) -> ProviderResult<()>;
}

/// Everything the pipelines need from a cloud
pub trait CloudProvider: Inventory + MetricsProvider + SizeCatalog + ResourceManager {}

impl<T> CloudProvider for T where T: Inventory + MetricsProvider + SizeCatalog + ResourceManager {}
