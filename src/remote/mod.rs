//! Pulling files from remote hosts with an external copy utility.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use strum::Display;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

/// One host to pull from, as listed under `[remote] targets`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTarget {
    pub username: String,
    pub ip: String,
    pub location: String,
}

impl RemoteTarget {
    fn host(&self) -> String {
        format!("{}@{}", self.username, self.ip)
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Unable to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which copy utility drives the pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CopyTool {
    Rsync,
    Scp,
}

impl CopyTool {
    /// `rsync` on Linux, `scp` everywhere else.
    pub fn for_host() -> Self {
        if cfg!(target_os = "linux") {
            Self::Rsync
        } else {
            Self::Scp
        }
    }

    /// Arguments copying `target` into `destination`.
    pub fn args(self, target: &RemoteTarget, destination: &Path) -> Vec<String> {
        let destination = destination.to_string_lossy().into_owned();
        match self {
            Self::Rsync => vec![
                "-ah".to_string(),
                format!("{}:{}", target.host(), target.location),
                destination,
            ],
            Self::Scp => vec![
                "-r".to_string(),
                format!("{}:{}*", target.host(), target.location),
                destination,
            ],
        }
    }
}

/// Result of pulling from one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub target: RemoteTarget,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl PullOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the copy utility against each target in turn.
#[derive(Debug, Clone)]
pub struct RemotePuller {
    save_folder: PathBuf,
    tool: CopyTool,
    program: String,
}

impl RemotePuller {
    pub fn new(save_folder: PathBuf) -> Self {
        let tool = CopyTool::for_host();
        Self {
            save_folder,
            tool,
            program: tool.to_string(),
        }
    }

    pub fn with_tool(mut self, tool: CopyTool) -> Self {
        self.tool = tool;
        self.program = tool.to_string();
        self
    }

    /// Run a different executable with the same argument layout.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Pull from one target. A non-zero exit is an outcome, not an error.
    pub async fn pull(&self, target: &RemoteTarget) -> Result<PullOutcome, RemoteError> {
        tokio::fs::create_dir_all(&self.save_folder).await?;

        let args = self.tool.args(target, &self.save_folder);
        info!(program = %self.program, host = %target.host(), "Pulling remote files");
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RemoteError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let outcome = PullOutcome {
            target: target.clone(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        if !outcome.succeeded() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            error!(
                host = %target.host(),
                exit_code = ?outcome.exit_code,
                stdout = %stdout.trim(),
                stderr = %outcome.stderr,
                "Unable to sync from remote"
            );
        }
        Ok(outcome)
    }

    /// Pull from every target, continuing past failed copies.
    pub async fn pull_all(&self, targets: &[RemoteTarget]) -> Result<Vec<PullOutcome>, RemoteError> {
        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            outcomes.push(self.pull(target).await?);
        }
        Ok(outcomes)
    }
}
