//! Shared fakes and fixtures for unit tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::{DeployError, Result};
use crate::notify::Notifier;
use crate::pipeline::Stage;
use crate::runner::{CommandRunner, StageCommand};
use crate::webhook::CommitSummary;

pub fn service(name: &str, mount_location: &str) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        auth_token: "test-secret".to_string(),
        git_ref: "refs/heads/main".to_string(),
        mount_location: PathBuf::from(mount_location),
        deploy_config_override: None,
        webhook: None,
        descriptor_source: None,
    }
}

pub fn commit() -> CommitSummary {
    CommitSummary {
        id: "abc123".to_string(),
        message: "Fix the thing".to_string(),
        author_name: "Dana".to_string(),
        author_email: "dana@example.com".to_string(),
    }
}

/// Records every command instead of running it.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<(PathBuf, StageCommand)>>,
    fail_on: Option<String>,
    delay: Option<Duration>,
}

impl RecordingRunner {
    /// Fails the first command whose display line equals `line`.
    pub fn failing_on(line: &str) -> Self {
        Self {
            fail_on: Some(line.to_string()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cmd)| cmd.display_line())
            .collect()
    }

    pub fn cwds(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(cwd, _)| cwd.clone())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cwd: &Path, command: &StageCommand) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((cwd.to_path_buf(), command.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let line = command.display_line();
        if self.fail_on.as_deref() == Some(line.as_str()) {
            return Err(DeployError::CommandFailed {
                command: line,
                exit_code: Some(1),
                output: "simulated failure".to_string(),
            });
        }
        Ok(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    Start { service: String, commit_id: String },
    StageError { stage: Stage, detail: String },
    Success { service: String, elapsed_ms: u128 },
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn report_start(&self, service: &str, commit: &CommitSummary) -> Result<()> {
        self.events.lock().unwrap().push(NotifyEvent::Start {
            service: service.to_string(),
            commit_id: commit.id.clone(),
        });
        Ok(())
    }

    async fn report_stage_error(&self, _service: &str, stage: Stage, detail: &str) -> Result<()> {
        self.events.lock().unwrap().push(NotifyEvent::StageError {
            stage,
            detail: detail.to_string(),
        });
        Ok(())
    }

    async fn report_success(
        &self,
        service: &str,
        _commit: &CommitSummary,
        elapsed_ms: u128,
    ) -> Result<()> {
        self.events.lock().unwrap().push(NotifyEvent::Success {
            service: service.to_string(),
            elapsed_ms,
        });
        Ok(())
    }
}

/// Every delivery fails.
#[derive(Debug, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn report_start(&self, _service: &str, _commit: &CommitSummary) -> Result<()> {
        Err(DeployError::ConfigError("endpoint down".to_string()))
    }

    async fn report_stage_error(&self, _service: &str, _stage: Stage, _detail: &str) -> Result<()> {
        Err(DeployError::ConfigError("endpoint down".to_string()))
    }

    async fn report_success(
        &self,
        _service: &str,
        _commit: &CommitSummary,
        _elapsed_ms: u128,
    ) -> Result<()> {
        Err(DeployError::ConfigError("endpoint down".to_string()))
    }
}
