//! External command execution.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{DeployError, Result};

/// A single program invocation, run in a service's working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// A hook line from the deployment descriptor, interpreted by `sh`.
    pub fn shell(line: &str) -> Self {
        Self::new("sh", &["-c", line])
    }

    /// The hook line for shell commands, otherwise the program and its arguments.
    pub fn display_line(&self) -> String {
        match (self.program.as_str(), self.args.as_slice()) {
            ("sh", [flag, line]) if flag == "-c" => line.clone(),
            _ => {
                let mut line = self.program.clone();
                for arg in &self.args {
                    line.push(' ');
                    line.push_str(arg);
                }
                line
            }
        }
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

/// Runs commands on behalf of the pipeline.
///
/// Returns the combined stdout/stderr on success. A non-zero exit is
/// `DeployError::CommandFailed` carrying the same combined output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cwd: &Path, command: &StageCommand) -> Result<String>;
}

/// Spawns real processes with `tokio::process`.
///
/// Children are killed if the future is dropped, so a stage timeout does not
/// leave the command running.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, cwd: &Path, command: &StageCommand) -> Result<String> {
        info!("Running (cwd = '{}'): {}", cwd.display(), command);

        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DeployError::CommandSpawn {
                command: command.display_line(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            debug!("'{}' output:\n{}", command, combined);
            Ok(combined)
        } else {
            Err(DeployError::CommandFailed {
                command: command.display_line(),
                exit_code: output.status.code(),
                output: combined,
            })
        }
    }
}
