//! In-memory lookup of configured services.

use std::collections::HashMap;

use crate::config::ServiceConfig;
use crate::error::{DeployError, Result};

/// Immutable map of service name to its configuration, built once at startup.
///
/// Names are matched case-insensitively, so `API` and `api` refer to the same
/// service and may not both be registered.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Vec<ServiceConfig>,
    by_name: HashMap<String, usize>,
}

impl ServiceRegistry {
    pub fn from_services(services: Vec<ServiceConfig>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(services.len());

        for (idx, service) in services.iter().enumerate() {
            service.validate()?;
            if by_name.insert(service.name.to_lowercase(), idx).is_some() {
                return Err(DeployError::DuplicateService(service.name.clone()));
            }
        }

        Ok(Self { services, by_name })
    }

    /// Finds a service by name, ignoring case.
    pub fn find_by_name(&self, name: &str) -> Option<&ServiceConfig> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&idx| &self.services[idx])
    }

    /// Registered services in configuration order.
    pub fn services(&self) -> &[ServiceConfig] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
