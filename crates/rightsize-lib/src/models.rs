//! Core data models for the right-sizer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A VM size offered by the cloud provider in a region
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkuProfile {
    pub name: String,
    pub cores: u32,
    pub memory_mb: u64,
}

impl SkuProfile {
    pub fn new(name: impl Into<String>, cores: u32, memory_mb: u64) -> Self {
        Self {
            name: name.into(),
            cores,
            memory_mb,
        }
    }
}

/// Why a right-sizing decision ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResizeReason {
    Resized,
    NoCandidate,
}

impl fmt::Display for ResizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeReason::Resized => write!(f, "RESIZED"),
            ResizeReason::NoCandidate => write!(f, "NO_CANDIDATE"),
        }
    }
}

/// Outcome of running the size matcher for a single VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeDecision {
    pub current: SkuProfile,
    pub chosen: Option<SkuProfile>,
    pub reason: ResizeReason,
}

impl ResizeDecision {
    pub fn resized(current: SkuProfile, chosen: SkuProfile) -> Self {
        Self {
            current,
            chosen: Some(chosen),
            reason: ResizeReason::Resized,
        }
    }

    pub fn no_candidate(current: SkuProfile) -> Self {
        Self {
            current,
            chosen: None,
            reason: ResizeReason::NoCandidate,
        }
    }
}

/// A subscription visible to the configured identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: String,
    pub display_name: String,
}

/// A virtual machine as seen by the inventory provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    /// Full ARM resource id
    pub id: String,
    pub name: String,
    pub subscription_id: String,
    pub location: String,
    pub vm_size: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl VirtualMachine {
    /// Resource group segment of the ARM id
    /// (`/subscriptions/{sub}/resourceGroups/{rg}/providers/...`)
    pub fn resource_group(&self) -> Option<&str> {
        self.id.split('/').nth(4).filter(|s| !s.is_empty())
    }

    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags.get(key).map(|v| v == value).unwrap_or(false)
    }
}

/// One aggregated metric sample as returned by the metrics provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

impl MetricPoint {
    pub fn new(average: f64, maximum: f64) -> Self {
        Self {
            timestamp: None,
            average: Some(average),
            maximum: Some(maximum),
        }
    }
}

/// Value written to the `LT 50%` export column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdFlag {
    /// Under-utilized and tagged as a candidate
    True,
    /// Not under-utilized
    False,
    /// Under-utilized, but the tag request conflicted with existing state
    #[serde(rename = "SPOT")]
    Spot,
}

impl fmt::Display for ThresholdFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdFlag::True => write!(f, "True"),
            ThresholdFlag::False => write!(f, "False"),
            ThresholdFlag::Spot => write!(f, "SPOT"),
        }
    }
}

/// Result of a resize attempt for a tagged VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeOutcome {
    Resized,
    Planned,
    NoCandidate,
    Failed,
    /// Resize accepted, but the VM could not be read back
    Unverified,
}

impl fmt::Display for ResizeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeOutcome::Resized => write!(f, "resized"),
            ResizeOutcome::Planned => write!(f, "planned"),
            ResizeOutcome::NoCandidate => write!(f, "no_candidate"),
            ResizeOutcome::Failed => write!(f, "failed"),
            ResizeOutcome::Unverified => write!(f, "unverified"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(id: &str) -> VirtualMachine {
        VirtualMachine {
            id: id.to_string(),
            name: "web-01".to_string(),
            subscription_id: "sub-1".to_string(),
            location: "westeurope".to_string(),
            vm_size: "Standard_D4s_v3".to_string(),
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_resource_group_from_arm_id() {
        let vm = vm("/subscriptions/sub-1/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/web-01");
        assert_eq!(vm.resource_group(), Some("rg-web"));
    }

    #[test]
    fn test_resource_group_missing() {
        assert_eq!(vm("/subscriptions/sub-1").resource_group(), None);
    }

    #[test]
    fn test_threshold_flag_serializes_spot_sentinel() {
        let json = serde_json::to_string(&ThresholdFlag::Spot).unwrap();
        assert_eq!(json, "\"SPOT\"");
        assert_eq!(ThresholdFlag::True.to_string(), "True");
    }

    #[test]
    fn test_has_tag() {
        let mut vm = vm("/subscriptions/sub-1/resourceGroups/rg/x");
        vm.tags.insert("candidate".into(), "right_size".into());
        assert!(vm.has_tag("candidate", "right_size"));
        assert!(!vm.has_tag("candidate", "other"));
        assert!(!vm.has_tag("missing", "right_size"));
    }
}
