//! In-memory provider backed by a JSON inventory snapshot
//!
//! Lets the scan and resize passes run without a cloud connection. Tag
//! merges and resizes are applied to the in-memory state so a later read
//! observes them.

use super::{Inventory, MetricsProvider, ResourceManager, SizeCatalog};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{MetricPoint, SkuProfile, Subscription, VirtualMachine};
use crate::utilization::{MetricKind, MetricWindow};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

/// Root of an inventory file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub subscriptions: Vec<SnapshotSubscription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSubscription {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: String,
    /// Size catalog per location, in provider order
    #[serde(default)]
    pub location_sizes: BTreeMap<String, Vec<SkuProfile>>,
    #[serde(default)]
    pub virtual_machines: Vec<SnapshotVm>,
    /// Listing this subscription's VMs fails with a server error
    #[serde(default, skip_serializing_if = "is_false")]
    pub list_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotVm {
    pub id: String,
    pub name: String,
    pub location: String,
    pub vm_size: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub generalized: bool,
    /// Tag merges on this VM fail with a conflict
    #[serde(default)]
    pub tag_conflict: bool,
    /// Resize requests are accepted but never take effect
    #[serde(default)]
    pub resize_ignored: bool,
    /// Metric queries for this VM fail with a server error
    #[serde(default, skip_serializing_if = "is_false")]
    pub metrics_error: bool,
    /// Tag merges on this VM fail with a server error
    #[serde(default, skip_serializing_if = "is_false")]
    pub tag_error: bool,
    /// Resize requests for this VM fail with a server error
    #[serde(default, skip_serializing_if = "is_false")]
    pub resize_error: bool,
    /// Reading this VM back by id fails as throttled
    #[serde(default, skip_serializing_if = "is_false")]
    pub read_error: bool,
    #[serde(default)]
    pub cpu: Vec<MetricPoint>,
    #[serde(default)]
    pub available_memory: Vec<MetricPoint>,
    /// Names of legal resize targets; defaults to the whole location catalog
    #[serde(default)]
    pub available_sizes: Option<Vec<String>>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn server_error(resource: &str) -> ProviderError {
    ProviderError::Http {
        status: 500,
        message: format!("injected failure for {}", resource),
    }
}

impl SnapshotVm {
    fn to_model(&self, subscription_id: &str) -> VirtualMachine {
        VirtualMachine {
            id: self.id.clone(),
            name: self.name.clone(),
            subscription_id: subscription_id.to_string(),
            location: self.location.clone(),
            vm_size: self.vm_size.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Provider serving an [`InventorySnapshot`]
pub struct InventoryProvider {
    state: RwLock<InventorySnapshot>,
}

impl InventoryProvider {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: InventorySnapshot =
            serde_json::from_str(json).context("Failed to parse inventory snapshot")?;
        Ok(Self::new(snapshot))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory file {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Current state, including applied tag merges and resizes
    pub async fn snapshot(&self) -> InventorySnapshot {
        self.state.read().await.clone()
    }

    /// Write the current state to `path` as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let json =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize inventory")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write inventory file {}", path.display()))
    }

    fn find_vm<'a>(
        snapshot: &'a InventorySnapshot,
        vm_id: &str,
    ) -> Option<(&'a SnapshotSubscription, &'a SnapshotVm)> {
        snapshot.subscriptions.iter().find_map(|sub| {
            sub.virtual_machines
                .iter()
                .find(|vm| vm.id.eq_ignore_ascii_case(vm_id))
                .map(|vm| (sub, vm))
        })
    }

    fn find_vm_mut<'a>(snapshot: &'a mut InventorySnapshot, vm_id: &str) -> Option<&'a mut SnapshotVm> {
        snapshot
            .subscriptions
            .iter_mut()
            .flat_map(|sub| sub.virtual_machines.iter_mut())
            .find(|vm| vm.id.eq_ignore_ascii_case(vm_id))
    }
}

#[async_trait]
impl Inventory for InventoryProvider {
    async fn list_subscriptions(&self) -> ProviderResult<Vec<Subscription>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .iter()
            .map(|s| Subscription {
                subscription_id: s.subscription_id.clone(),
                display_name: if s.display_name.is_empty() {
                    s.subscription_id.clone()
                } else {
                    s.display_name.clone()
                },
            })
            .collect())
    }

    async fn list_virtual_machines(
        &self,
        subscription_id: &str,
    ) -> ProviderResult<Vec<VirtualMachine>> {
        let state = self.state.read().await;
        let sub = state
            .subscriptions
            .iter()
            .find(|s| s.subscription_id == subscription_id)
            .ok_or_else(|| ProviderError::NotFound(format!("/subscriptions/{}", subscription_id)))?;

        if sub.list_error {
            return Err(server_error(&format!("/subscriptions/{}", subscription_id)));
        }

        Ok(sub
            .virtual_machines
            .iter()
            .map(|vm| vm.to_model(&sub.subscription_id))
            .collect())
    }

    async fn get_virtual_machine(&self, vm_id: &str) -> ProviderResult<VirtualMachine> {
        let state = self.state.read().await;
        let (sub, vm) = Self::find_vm(&state, vm_id)
            .ok_or_else(|| ProviderError::NotFound(vm_id.to_string()))?;

        if vm.read_error {
            return Err(ProviderError::Throttled(format!("injected throttling for {}", vm_id)));
        }
        Ok(vm.to_model(&sub.subscription_id))
    }

    async fn is_generalized(&self, vm: &VirtualMachine) -> ProviderResult<bool> {
        let state = self.state.read().await;
        Self::find_vm(&state, &vm.id)
            .map(|(_, vm)| vm.generalized)
            .ok_or_else(|| ProviderError::NotFound(vm.id.clone()))
    }
}

#[async_trait]
impl MetricsProvider for InventoryProvider {
    async fn fetch_metric(
        &self,
        resource_id: &str,
        kind: MetricKind,
        _window: &MetricWindow,
    ) -> ProviderResult<Vec<MetricPoint>> {
        let state = self.state.read().await;
        let (_, vm) = Self::find_vm(&state, resource_id)
            .ok_or_else(|| ProviderError::NotFound(resource_id.to_string()))?;

        if vm.metrics_error {
            return Err(server_error(resource_id));
        }

        Ok(match kind {
            MetricKind::Cpu => vm.cpu.clone(),
            MetricKind::AvailableMemory => vm.available_memory.clone(),
        })
    }
}

#[async_trait]
impl SizeCatalog for InventoryProvider {
    async fn list_location_sizes(
        &self,
        subscription_id: &str,
        location: &str,
    ) -> ProviderResult<Vec<SkuProfile>> {
        let state = self.state.read().await;
        let sub = state
            .subscriptions
            .iter()
            .find(|s| s.subscription_id == subscription_id)
            .ok_or_else(|| ProviderError::NotFound(format!("/subscriptions/{}", subscription_id)))?;

        Ok(sub.location_sizes.get(location).cloned().unwrap_or_default())
    }

    async fn list_available_sizes(&self, vm: &VirtualMachine) -> ProviderResult<Vec<SkuProfile>> {
        let state = self.state.read().await;
        let (sub, snapshot_vm) = Self::find_vm(&state, &vm.id)
            .ok_or_else(|| ProviderError::NotFound(vm.id.clone()))?;

        let catalog = sub
            .location_sizes
            .get(&snapshot_vm.location)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(match &snapshot_vm.available_sizes {
            Some(names) => names
                .iter()
                .filter_map(|name| catalog.iter().find(|s| &s.name == name).cloned())
                .collect(),
            None => catalog.to_vec(),
        })
    }
}

#[async_trait]
impl ResourceManager for InventoryProvider {
    async fn merge_tags(
        &self,
        resource_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        let mut state = self.state.write().await;
        let vm = Self::find_vm_mut(&mut state, resource_id)
            .ok_or_else(|| ProviderError::NotFound(resource_id.to_string()))?;

        if vm.tag_conflict {
            return Err(ProviderError::Conflict {
                resource: resource_id.to_string(),
                message: "tag update conflicts with existing resource state".to_string(),
            });
        }
        if vm.tag_error {
            return Err(server_error(resource_id));
        }

        vm.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn resize(&self, vm: &VirtualMachine, vm_size: &str) -> ProviderResult<()> {
        let mut state = self.state.write().await;
        let snapshot_vm = Self::find_vm_mut(&mut state, &vm.id)
            .ok_or_else(|| ProviderError::NotFound(vm.id.clone()))?;

        if snapshot_vm.resize_error {
            return Err(server_error(&vm.id));
        }
        if !snapshot_vm.resize_ignored {
            snapshot_vm.vm_size = vm_size.to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SNAPSHOT: &str = r#"{
        "subscriptions": [{
            "subscription_id": "sub-1",
            "display_name": "Production",
            "location_sizes": {
                "westeurope": [
                    {"name": "Standard_D2s_v3", "cores": 2, "memory_mb": 8192},
                    {"name": "Standard_D4s_v3", "cores": 4, "memory_mb": 16384},
                    {"name": "Standard_E2s_v3", "cores": 2, "memory_mb": 16384}
                ]
            },
            "virtual_machines": [{
                "id": "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/web",
                "name": "web",
                "location": "westeurope",
                "vm_size": "Standard_D4s_v3",
                "cpu": [{"average": 5.0, "maximum": 12.0}],
                "available_sizes": ["Standard_E2s_v3", "Standard_D2s_v3", "Standard_Unknown"]
            }, {
                "id": "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/spot",
                "name": "spot",
                "location": "westeurope",
                "vm_size": "Standard_D4s_v3",
                "tag_conflict": true
            }]
        }]
    }"#;

    const WEB: &str =
        "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/web";

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();

        let provider = InventoryProvider::load(file.path()).unwrap();
        let subs = provider.list_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].display_name, "Production");

        let vms = provider.list_virtual_machines("sub-1").await.unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].subscription_id, "sub-1");
    }

    #[tokio::test]
    async fn test_available_sizes_keep_listed_order() {
        let provider = InventoryProvider::from_json(SNAPSHOT).unwrap();
        let vm = provider.get_virtual_machine(WEB).await.unwrap();

        let names: Vec<_> = provider
            .list_available_sizes(&vm)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Standard_E2s_v3", "Standard_D2s_v3"]);
    }

    #[tokio::test]
    async fn test_merge_tags_and_conflict() {
        let provider = InventoryProvider::from_json(SNAPSHOT).unwrap();
        let mut tags = BTreeMap::new();
        tags.insert("candidate".to_string(), "right_size".to_string());

        provider.merge_tags(WEB, &tags).await.unwrap();
        let vm = provider.get_virtual_machine(WEB).await.unwrap();
        assert!(vm.has_tag("candidate", "right_size"));

        let spot = WEB.replace("/web", "/spot");
        let err = provider.merge_tags(&spot, &tags).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_resize_applies() {
        let provider = InventoryProvider::from_json(SNAPSHOT).unwrap();
        let vm = provider.get_virtual_machine(WEB).await.unwrap();

        provider.resize(&vm, "Standard_D2s_v3").await.unwrap();
        let vm = provider.get_virtual_machine(WEB).await.unwrap();
        assert_eq!(vm.vm_size, "Standard_D2s_v3");
    }

    #[tokio::test]
    async fn test_save_persists_applied_changes() {
        let provider = InventoryProvider::from_json(SNAPSHOT).unwrap();
        let vm = provider.get_virtual_machine(WEB).await.unwrap();
        provider.resize(&vm, "Standard_D2s_v3").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        provider.save(&path).await.unwrap();

        let reloaded = InventoryProvider::load(&path).unwrap();
        let vm = reloaded.get_virtual_machine(WEB).await.unwrap();
        assert_eq!(vm.vm_size, "Standard_D2s_v3");
        let snapshot = reloaded.snapshot().await;
        assert_eq!(snapshot.subscriptions[0].virtual_machines.len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let json = SNAPSHOT.replace(
            r#""tag_conflict": true"#,
            r#""tag_error": true, "metrics_error": true, "resize_error": true, "read_error": true"#,
        );
        let provider = InventoryProvider::from_json(&json).unwrap();
        let spot = WEB.replace("/web", "/spot");
        let vm = provider
            .list_virtual_machines("sub-1")
            .await
            .unwrap()
            .into_iter()
            .find(|vm| vm.id == spot)
            .unwrap();

        let err = provider.resize(&vm, "Standard_D2s_v3").await.unwrap_err();
        assert!(err.is_retryable());

        let err = provider
            .fetch_metric(&spot, MetricKind::Cpu, &MetricWindow::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let err = provider.merge_tags(&spot, &BTreeMap::new()).await.unwrap_err();
        assert!(!err.is_conflict());

        let err = provider.get_virtual_machine(&spot).await.unwrap_err();
        assert!(matches!(err, ProviderError::Throttled(_)));
    }

    #[tokio::test]
    async fn test_missing_vm_is_not_found() {
        let provider = InventoryProvider::from_json(SNAPSHOT).unwrap();
        let err = provider.get_virtual_machine("/nope").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_metrics_by_kind() {
        let provider = InventoryProvider::from_json(SNAPSHOT).unwrap();
        let window = MetricWindow::default();
        let cpu = provider
            .fetch_metric(WEB, MetricKind::Cpu, &window)
            .await
            .unwrap();
        let memory = provider
            .fetch_metric(WEB, MetricKind::AvailableMemory, &window)
            .await
            .unwrap();
        assert_eq!(cpu, vec![MetricPoint::new(5.0, 12.0)]);
        assert!(memory.is_empty());
    }
}
