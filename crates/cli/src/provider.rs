//! Provider selection

use crate::config::Config;
use anyhow::Result;
use rightsize_lib::provider::{ArmClient, CloudProvider, InventoryProvider};
use std::path::{Path, PathBuf};
use tracing::info;

/// Where a run reads from and applies its changes to
pub enum Backend {
    /// JSON snapshot; applied tags and resizes are written back to `path`
    Inventory {
        provider: InventoryProvider,
        path: PathBuf,
    },
    Arm(ArmClient),
}

impl Backend {
    pub fn provider(&self) -> &dyn CloudProvider {
        match self {
            Backend::Inventory { provider, .. } => provider,
            Backend::Arm(client) => client,
        }
    }

    /// Write an offline snapshot back to its file; Azure applies changes itself
    pub async fn persist(&self) -> Result<()> {
        if let Backend::Inventory { provider, path } = self {
            provider.save(path).await?;
            info!(inventory = %path.display(), "Saved inventory");
        }
        Ok(())
    }
}

/// Offline inventory when a snapshot path is given, ARM otherwise
pub fn connect(inventory: Option<&Path>, config: &Config) -> Result<Backend> {
    if let Some(path) = inventory {
        info!(inventory = %path.display(), "Using offline inventory");
        return Ok(Backend::Inventory {
            provider: InventoryProvider::load(path)?,
            path: path.to_path_buf(),
        });
    }

    let client = ArmClient::new(config.arm_client_config()?)?;
    info!(endpoint = %client.endpoint(), "Using Azure Resource Manager");
    Ok(Backend::Arm(client))
}
