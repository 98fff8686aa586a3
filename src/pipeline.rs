//! The deployment pipeline: pre-pull hooks, repository sync, post-pull hooks.
//!
//! Stages run strictly in order and the first failure ends the run. Nothing
//! is rolled back; whatever a failed hook already changed on disk stays.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::config::{DEFAULT_STAGE_TIMEOUT_SECS, DescriptorSource, ServiceConfig};
use crate::descriptor::{DeploymentDescriptor, load_descriptor};
use crate::error::{DeployError, Result};
use crate::notify::{Notifier, log_delivery};
use crate::runner::{CommandRunner, StageCommand};
use crate::webhook::CommitSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PrePull,
    Sync,
    PostPull,
}

impl Stage {
    /// Human-readable name used in logs and notification titles.
    pub fn title(self) -> &'static str {
        match self {
            Stage::PrePull => "Pre Pull",
            Stage::Sync => "Pull",
            Stage::PostPull => "Post Pull",
        }
    }

    pub fn error_summary(self) -> &'static str {
        match self {
            Stage::PrePull => "Error while running pre pull commands",
            Stage::Sync => "Error while pulling",
            Stage::PostPull => "Error while running post pull commands",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Where a deployment run ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running(Stage),
    Succeeded,
    Failed(Stage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOutcome {
    Succeeded { elapsed: Duration },
    Failed { stage: Stage, detail: String },
}

impl DeploymentOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            DeploymentOutcome::Succeeded { .. } => PipelineState::Succeeded,
            DeploymentOutcome::Failed { stage, .. } => PipelineState::Failed(*stage),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeploymentOutcome::Succeeded { .. })
    }
}

/// `git reset --hard` followed by `git pull`.
pub fn sync_commands() -> [StageCommand; 2] {
    [
        StageCommand::new("git", &["reset", "--hard"]),
        StageCommand::new("git", &["pull"]),
    ]
}

fn hook_commands(lines: &[String]) -> Vec<StageCommand> {
    lines.iter().map(|line| StageCommand::shell(line)).collect()
}

/// One deployment of one service, ready to run.
pub struct DeploymentPipeline {
    service: ServiceConfig,
    descriptor: DeploymentDescriptor,
    commit: CommitSummary,
    runner: Arc<dyn CommandRunner>,
    notifier: Arc<dyn Notifier>,
    stage_timeout: Duration,
    descriptor_source: DescriptorSource,
}

impl DeploymentPipeline {
    pub fn new(
        service: ServiceConfig,
        descriptor: DeploymentDescriptor,
        commit: CommitSummary,
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            service,
            descriptor,
            commit,
            runner,
            notifier,
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            descriptor_source: DescriptorSource::PreSync,
        }
    }

    pub fn with_stage_timeout(mut self, stage_timeout: Duration) -> Self {
        self.stage_timeout = stage_timeout;
        self
    }

    pub fn with_descriptor_source(mut self, descriptor_source: DescriptorSource) -> Self {
        self.descriptor_source = descriptor_source;
        self
    }

    /// Run every stage, reporting progress to the notifier.
    pub async fn run(self) -> DeploymentOutcome {
        let start = Instant::now();
        let name = self.service.name.clone();

        info!("[{}] Deploying {}", name, self.commit);
        debug!(
            "[{}] descriptor flags: isPM2={} isDocker={} isDockerCompose={}",
            name,
            self.descriptor.is_pm2,
            self.descriptor.is_docker,
            self.descriptor.is_docker_compose
        );
        log_delivery("start", self.notifier.report_start(&name, &self.commit).await);

        let pre_pull = hook_commands(&self.descriptor.pre_pull);
        if !pre_pull.is_empty() {
            if let Err(e) = self.run_stage(Stage::PrePull, &pre_pull).await {
                return self.fail(Stage::PrePull, e).await;
            }
        }

        if let Err(e) = self.run_stage(Stage::Sync, &sync_commands()).await {
            return self.fail(Stage::Sync, e).await;
        }

        let post_pull_lines = match self.descriptor_source {
            DescriptorSource::PreSync => self.descriptor.post_pull.clone(),
            DescriptorSource::PostSync => {
                let reloaded = load_descriptor(
                    &self.service.mount_location,
                    self.service.deploy_config_override.as_deref(),
                )
                .await;
                match reloaded {
                    Ok(fresh) => {
                        debug!("[{}] Re-read deployment config after pull", name);
                        fresh.post_pull
                    }
                    Err(e) => return self.fail(Stage::PostPull, e).await,
                }
            }
        };
        let post_pull = hook_commands(&post_pull_lines);
        if !post_pull.is_empty() {
            if let Err(e) = self.run_stage(Stage::PostPull, &post_pull).await {
                return self.fail(Stage::PostPull, e).await;
            }
        }

        let elapsed = start.elapsed();
        info!("[{}] Deployed {} in {}ms", name, self.commit, elapsed.as_millis());
        log_delivery(
            "success",
            self.notifier
                .report_success(&name, &self.commit, elapsed.as_millis())
                .await,
        );

        DeploymentOutcome::Succeeded { elapsed }
    }

    /// Run a stage's commands in order, stopping at the first failure.
    async fn run_stage(&self, stage: Stage, commands: &[StageCommand]) -> Result<()> {
        debug!(
            "[{}] {:?}: {} command(s)",
            self.service.name,
            PipelineState::Running(stage),
            commands.len()
        );

        let cwd = self.service.mount_location.as_path();
        let runner = &self.runner;
        let steps = async {
            for command in commands {
                let output = runner.run(cwd, command).await?;
                debug!("{} step '{}' output:\n{}", stage, command, output);
            }
            Ok::<(), DeployError>(())
        };

        match tokio::time::timeout(self.stage_timeout, steps).await {
            Ok(result) => result,
            Err(_) => Err(DeployError::StageTimeout(self.stage_timeout)),
        }
    }

    async fn fail(&self, stage: Stage, err: DeployError) -> DeploymentOutcome {
        let detail = err.to_string();
        error!("[{}] {} Error: {}", self.service.name, stage, detail);
        log_delivery(
            "stage error",
            self.notifier
                .report_stage_error(&self.service.name, stage, &detail)
                .await,
        );

        DeploymentOutcome::Failed { stage, detail }
    }
}
