//! Deployment lifecycle notifications.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::pipeline::Stage;
use crate::webhook::{CommitSummary, truncate_chars};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
/// Discord refuses embeds whose field values are longer than this.
const MAX_FIELD_VALUE_LEN: usize = 1024;

const COLOR_INFO: u32 = 0x4fddf3;
const COLOR_ERROR: u32 = 0xff0000;
const COLOR_SUCCESS: u32 = 0x65b125;

/// Receives deployment lifecycle events.
///
/// Implementations are best-effort: the pipeline logs a returned error and
/// carries on, so a broken endpoint never changes a deployment's outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn report_start(&self, service: &str, commit: &CommitSummary) -> Result<()>;

    async fn report_stage_error(&self, service: &str, stage: Stage, detail: &str) -> Result<()>;

    async fn report_success(
        &self,
        service: &str,
        commit: &CommitSummary,
        elapsed_ms: u128,
    ) -> Result<()>;
}

/// Used when neither the service nor its descriptor names an endpoint.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn report_start(&self, _service: &str, _commit: &CommitSummary) -> Result<()> {
        Ok(())
    }

    async fn report_stage_error(&self, _service: &str, _stage: Stage, _detail: &str) -> Result<()> {
        Ok(())
    }

    async fn report_success(
        &self,
        _service: &str,
        _commit: &CommitSummary,
        _elapsed_ms: u128,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: String,
    color: u32,
    fields: [EmbedField<'a>; 1],
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EmbedField<'a> {
    name: &'a str,
    value: String,
}

/// Posts Discord-style embed messages to a webhook URL.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    url: String,
}

impl DiscordNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn send(&self, title: String, color: u32, name: &str, value: String) -> Result<()> {
        let message = WebhookMessage {
            embeds: [Embed {
                title,
                color,
                fields: [EmbedField {
                    name,
                    value: truncate_chars(&value, MAX_FIELD_VALUE_LEN),
                }],
                timestamp: Utc::now().to_rfc3339(),
            }],
        };

        self.client
            .post(&self.url)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn report_start(&self, service: &str, commit: &CommitSummary) -> Result<()> {
        self.send(
            format!("{} - Starting Deploy", service),
            COLOR_INFO,
            "Deployment Info",
            commit.deployment_info(),
        )
        .await
    }

    async fn report_stage_error(&self, service: &str, stage: Stage, detail: &str) -> Result<()> {
        self.send(
            format!("{} - {} Error", service, stage.title()),
            COLOR_ERROR,
            stage.error_summary(),
            format!("Error: {}", detail),
        )
        .await
    }

    async fn report_success(
        &self,
        service: &str,
        commit: &CommitSummary,
        elapsed_ms: u128,
    ) -> Result<()> {
        self.send(
            format!("{} - Deployed", service),
            COLOR_SUCCESS,
            "Deployment Info",
            format!("{}\nTime: {}ms", commit.deployment_info(), elapsed_ms),
        )
        .await
    }
}

/// Builds the notifier for one deployment from the configured endpoints.
#[derive(Debug, Clone)]
pub struct NotifierFactory {
    client: Client,
}

impl NotifierFactory {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(NOTIFY_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// The service-level endpoint wins over the descriptor's.
    pub fn notifier_for(
        &self,
        service_webhook: Option<&str>,
        descriptor_webhook: Option<&str>,
    ) -> Arc<dyn Notifier> {
        match select_endpoint(service_webhook, descriptor_webhook) {
            Some(url) => {
                debug!("Notifications for this deployment go to the configured webhook");
                Arc::new(DiscordNotifier::new(self.client.clone(), url))
            }
            None => Arc::new(NoopNotifier),
        }
    }
}

fn select_endpoint<'a>(service: Option<&'a str>, descriptor: Option<&'a str>) -> Option<&'a str> {
    service
        .filter(|url| !url.is_empty())
        .or(descriptor.filter(|url| !url.is_empty()))
}

/// Log, rather than propagate, a failed notification.
pub(crate) fn log_delivery(event: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("Failed to send {} notification: {}", event, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::commit;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::Mutex;

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn capture(State(seen): State<Captured>, Json(body): Json<Value>) -> StatusCode {
        seen.lock().unwrap().push(body);
        StatusCode::NO_CONTENT
    }

    /// Serves a local webhook endpoint that records every posted body.
    async fn capture_server() -> (DiscordNotifier, Captured) {
        let seen = Captured::default();
        let app = Router::new()
            .route("/hook", post(capture))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier = DiscordNotifier::new(Client::new(), format!("http://{addr}/hook"));
        (notifier, seen)
    }

    fn only_embed(seen: &Captured) -> Value {
        let bodies = seen.lock().unwrap();
        assert_eq!(bodies.len(), 1, "{bodies:?}");
        bodies[0]["embeds"][0].clone()
    }

    #[test]
    fn service_endpoint_takes_priority() {
        assert_eq!(select_endpoint(Some("svc"), Some("desc")), Some("svc"));
        assert_eq!(select_endpoint(None, Some("desc")), Some("desc"));
        assert_eq!(select_endpoint(Some(""), Some("desc")), Some("desc"));
        assert_eq!(select_endpoint(None, None), None);
    }

    #[tokio::test]
    async fn start_message() {
        let (notifier, seen) = capture_server().await;
        notifier.report_start("api", &commit()).await.unwrap();

        let embed = only_embed(&seen);
        assert_eq!(embed["title"], "api - Starting Deploy");
        assert_eq!(embed["color"], COLOR_INFO);
        assert_eq!(embed["fields"][0]["name"], "Deployment Info");
        assert_eq!(embed["fields"][0]["value"], commit().deployment_info());
        assert!(embed["timestamp"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn stage_error_messages() {
        let cases = [
            (Stage::PrePull, "api - Pre Pull Error", "Error while running pre pull commands"),
            (Stage::Sync, "api - Pull Error", "Error while pulling"),
            (Stage::PostPull, "api - Post Pull Error", "Error while running post pull commands"),
        ];

        for (stage, title, field) in cases {
            let (notifier, seen) = capture_server().await;
            notifier.report_stage_error("api", stage, "exit code 1").await.unwrap();

            let embed = only_embed(&seen);
            assert_eq!(embed["title"], title);
            assert_eq!(embed["color"], COLOR_ERROR);
            assert_eq!(embed["fields"][0]["name"], field);
            assert_eq!(embed["fields"][0]["value"], "Error: exit code 1");
        }
    }

    #[tokio::test]
    async fn success_message_carries_elapsed_time() {
        let (notifier, seen) = capture_server().await;
        notifier.report_success("api", &commit(), 1234).await.unwrap();

        let embed = only_embed(&seen);
        assert_eq!(embed["title"], "api - Deployed");
        assert_eq!(embed["color"], COLOR_SUCCESS);
        let value = embed["fields"][0]["value"].as_str().unwrap();
        assert!(value.starts_with("Trigger: GitHub Webhook\n"));
        assert!(value.ends_with("\nTime: 1234ms"), "{value}");
    }

    #[tokio::test]
    async fn long_command_output_fits_in_field() {
        let (notifier, seen) = capture_server().await;
        let output = "npm ERR! ".repeat(500);
        notifier
            .report_stage_error("api", Stage::PostPull, &output)
            .await
            .unwrap();

        let embed = only_embed(&seen);
        assert_eq!(embed["title"], "api - Post Pull Error");
        let value = embed["fields"][0]["value"].as_str().unwrap();
        assert_eq!(value.chars().count(), MAX_FIELD_VALUE_LEN);
        assert!(value.starts_with("Error: npm ERR! "));
        assert!(value.ends_with("... (truncated)"));
    }

    #[tokio::test]
    async fn noop_notifier_always_succeeds() {
        let notifier = NotifierFactory::new().unwrap().notifier_for(None, None);

        assert!(notifier.report_start("api", &commit()).await.is_ok());
        assert!(notifier.report_stage_error("api", Stage::Sync, "boom").await.is_ok());
        assert!(notifier.report_success("api", &commit(), 12).await.is_ok());
    }

    #[tokio::test]
    async fn rejected_delivery_is_an_error() {
        let app = Router::new().route("/hook", post(|| async { StatusCode::BAD_REQUEST }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier = NotifierFactory::new()
            .unwrap()
            .notifier_for(Some(&format!("http://{addr}/hook")), None);
        assert!(notifier.report_start("api", &commit()).await.is_err());
    }
}
