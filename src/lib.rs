pub mod api;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod lock;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod signature;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_utils;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use config::ServerConfig;
use lock::DeployLocks;
use notify::NotifierFactory;
use registry::ServiceRegistry;
use runner::CommandRunner;

pub use api::build_router;

pub struct AppState {
    pub registry: ServiceRegistry,
    pub settings: ServerConfig,
    pub runner: Arc<dyn CommandRunner>,
    pub notifiers: NotifierFactory,
    pub deploy_locks: DeployLocks,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        registry: ServiceRegistry,
        settings: ServerConfig,
        runner: Arc<dyn CommandRunner>,
        notifiers: NotifierFactory,
    ) -> Self {
        Self {
            registry,
            settings,
            runner,
            notifiers,
            deploy_locks: DeployLocks::new(),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
