//! API module for all HTTP handlers

pub mod handlers;
pub mod webhook;

use axum::{Router, routing};

use crate::SharedState;

pub use handlers::root;
pub use webhook::{Rejected, handle_webhook};

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/webhook/{service}", routing::post(handle_webhook))
        .with_state(state)
}
