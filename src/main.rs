use git_deployhook::config::{DeployHookConfig, load_config};
use git_deployhook::error::DeployError;
use git_deployhook::logging::{FileLogger, setup_logging};
use git_deployhook::notify::NotifierFactory;
use git_deployhook::registry::ServiceRegistry;
use git_deployhook::runner::ProcessRunner;
use git_deployhook::{AppState, build_router};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "deployhook.toml";

fn build_state(config: DeployHookConfig) -> Result<AppState, DeployError> {
    let registry = ServiceRegistry::from_services(config.service)?;
    let notifiers = NotifierFactory::new()?;
    Ok(AppState::new(
        registry,
        config.server,
        Arc::new(ProcessRunner),
        notifiers,
    ))
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("DEPLOYHOOK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Ok(bind_address) = std::env::var("BIND_ADDRESS") {
        config.server.bind_address = bind_address;
    }

    let file_logger = config.server.log_dir.clone().map(FileLogger::new);
    let _log_guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging setup error: {}", e);
            std::process::exit(1);
        }
    };

    let bind_address = config.server.bind_address.clone();
    let state = match build_state(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Using config at {:?}", config_path);
    if state.registry.is_empty() {
        info!("No services registered");
    } else {
        info!("Registered Services:");
        for service in state.registry.services() {
            info!(" - {}", service.name);
        }
    }

    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", bind_address);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
