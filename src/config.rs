//! Static configuration: server settings plus the registered services.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DeployError, Result};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3090";
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 600;

/// Which copy of the deployment descriptor drives the post-pull stage.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DescriptorSource {
    /// Read once before syncing and use it for the whole run.
    #[default]
    PreSync,
    /// Re-read after syncing so post-pull hooks see the pushed descriptor.
    PostSync,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeployHookConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub service: Vec<ServiceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    #[serde(default)]
    pub descriptor_source: DescriptorSource,
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            descriptor_source: DescriptorSource::default(),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.stage_timeout_secs == 0 {
            return Err(DeployError::ConfigError(
                "'stage_timeout_secs' must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_stage_timeout_secs() -> u64 {
    DEFAULT_STAGE_TIMEOUT_SECS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub auth_token: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub mount_location: PathBuf,
    pub deploy_config_override: Option<String>,
    pub webhook: Option<String>,
    pub descriptor_source: Option<DescriptorSource>,
}

impl ServiceConfig {
    /// Returns the descriptor source for this service, falling back to the server default.
    pub fn descriptor_source_or(&self, default: DescriptorSource) -> DescriptorSource {
        self.descriptor_source.unwrap_or(default)
    }

    /// Returns true if a push to `git_ref` should deploy this service.
    pub fn matches_ref(&self, git_ref: &str) -> bool {
        self.git_ref == git_ref
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let missing = if self.name.trim().is_empty() {
            Some("name")
        } else if self.auth_token.is_empty() {
            Some("auth_token")
        } else if self.git_ref.is_empty() {
            Some("ref")
        } else if self.mount_location.as_os_str().is_empty() {
            Some("mount_location")
        } else {
            None
        };

        match missing {
            Some(field) => Err(DeployError::ConfigError(format!(
                "service '{}' has an empty '{}'",
                self.name, field
            ))),
            None => Ok(()),
        }
    }
}

/// Parse a configuration document and check the server settings.
pub fn parse_config(config_str: &str) -> Result<DeployHookConfig> {
    let config: DeployHookConfig = toml::from_str(config_str)?;
    config.server.validate()?;
    Ok(config)
}

/// Load and parse the configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<DeployHookConfig> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| {
        DeployError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&config_str).map_err(|e| {
        DeployError::ConfigError(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}
