//! Per-repository deployment descriptor (`deploy.json`).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{DeployError, Result};

pub const DEFAULT_DESCRIPTOR_FILE: &str = "deploy.json";

/// Hooks and notification target declared by the repository being deployed.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDescriptor {
    #[serde(default)]
    pub pre_pull: Vec<String>,
    #[serde(default)]
    pub post_pull: Vec<String>,
    pub webhook: Option<String>,

    // Informational only; nothing in the pipeline branches on these.
    #[serde(default, rename = "isPM2")]
    pub is_pm2: bool,
    #[serde(default)]
    pub is_docker: bool,
    #[serde(default)]
    pub is_docker_compose: bool,
}

/// Path of the descriptor inside a working tree.
pub fn descriptor_path(mount_location: &Path, override_filename: Option<&str>) -> PathBuf {
    mount_location.join(override_filename.unwrap_or(DEFAULT_DESCRIPTOR_FILE))
}

/// Read and parse the descriptor from `mount_location`.
pub async fn load_descriptor(
    mount_location: &Path,
    override_filename: Option<&str>,
) -> Result<DeploymentDescriptor> {
    let path = descriptor_path(mount_location, override_filename);

    let raw = fs::read(&path)
        .await
        .map_err(|source| DeployError::ConfigRead {
            path: path.clone(),
            source,
        })?;

    serde_json::from_slice(&raw).map_err(|source| DeployError::DescriptorParse { path, source })
}
