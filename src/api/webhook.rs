//! Webhook handler for GitHub push events

use axum::{
    body::Bytes,
    extract::{Path, State as AxumState},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::descriptor::load_descriptor;
use crate::pipeline::DeploymentPipeline;
use crate::signature::verify_signature;
use crate::webhook::PushEvent;

const HEADER_EVENT: &str = "X-GitHub-Event";
const HEADER_SIGNATURE: &str = "X-Hub-Signature-256";

/// Reasons a webhook delivery does not start a deployment.
#[derive(Debug, thiserror::Error)]
pub enum Rejected {
    #[error("Didn't deploy, not a push event")]
    NotPush,

    #[error("Unknown service {0}")]
    UnknownService(String),

    #[error("Didn't deploy, signature didn't match")]
    BadSignature,

    #[error("Didn't deploy, malformed payload")]
    MalformedPayload,

    #[error("Didn't deploy, deployment config could not be read")]
    DeployConfigUnreadable,

    #[error("Didn't deploy, branch didn't match")]
    BranchMismatch,
}

impl Rejected {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejected::NotPush | Rejected::BranchMismatch => StatusCode::OK,
            Rejected::UnknownService(_) => StatusCode::NOT_FOUND,
            Rejected::BadSignature => StatusCode::FORBIDDEN,
            Rejected::MalformedPayload => StatusCode::BAD_REQUEST,
            Rejected::DeployConfigUnreadable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Rejected {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Handles `POST /webhook/{service}`.
///
/// Every check happens before the response is sent; the deployment itself
/// runs on a spawned task and its result is only visible in logs and
/// notifications.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    Path(service_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, Rejected> {
    // Only handle "push" events.
    let event = headers.get(HEADER_EVENT).and_then(|v| v.to_str().ok());
    if event != Some("push") {
        info!(
            "[{}] Didn't deploy, not a push event (received {:?})",
            service_name, event
        );
        return Err(Rejected::NotPush);
    }

    let Some(service) = state.registry.find_by_name(&service_name) else {
        warn!("Unknown service {}", service_name);
        return Err(Rejected::UnknownService(service_name));
    };

    let signature = headers.get(HEADER_SIGNATURE).and_then(|v| v.to_str().ok());
    if !verify_signature(&body, signature, service.auth_token.as_bytes()) {
        warn!("[{}] Didn't deploy, signature didn't match", service.name);
        return Err(Rejected::BadSignature);
    }

    let event = match PushEvent::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("[{}] Could not parse push payload: {}", service.name, e);
            return Err(Rejected::MalformedPayload);
        }
    };

    let descriptor = match load_descriptor(
        &service.mount_location,
        service.deploy_config_override.as_deref(),
    )
    .await
    {
        Ok(descriptor) => descriptor,
        Err(e) => {
            error!("[{}] Didn't deploy: {}", service.name, e);
            return Err(Rejected::DeployConfigUnreadable);
        }
    };

    if !service.matches_ref(&event.git_ref) {
        info!(
            "[{}] Didn't deploy, branch didn't match ({} != {})",
            service.name, event.git_ref, service.git_ref
        );
        return Err(Rejected::BranchMismatch);
    }

    let deployment_id = Uuid::now_v7();
    let notifier = state
        .notifiers
        .notifier_for(service.webhook.as_deref(), descriptor.webhook.as_deref());
    let pipeline = DeploymentPipeline::new(
        service.clone(),
        descriptor,
        event.commit_summary(),
        state.runner.clone(),
        notifier,
    )
    .with_stage_timeout(state.settings.stage_timeout())
    .with_descriptor_source(service.descriptor_source_or(state.settings.descriptor_source));

    info!(
        "[{}] Dispatching deployment {} for {}",
        service.name, deployment_id, event.git_ref
    );

    let span = info_span!("deploy", service = %service.name, %deployment_id);
    let mount_location = service.mount_location.clone();
    let shared_state = state.clone();

    // Spawn a background task so GitHub gets its response right away.
    tokio::spawn(
        async move {
            let _guard = match shared_state.deploy_locks.try_acquire(&mount_location).await {
                Some(guard) => guard,
                None => {
                    info!("Another deployment of this working tree is running, waiting");
                    shared_state.deploy_locks.acquire(&mount_location).await
                }
            };

            let outcome = pipeline.run().await;
            info!("Deployment finished: {:?}", outcome.state());
        }
        .instrument(span),
    );

    Ok("Deploying")
}
