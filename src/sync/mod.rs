//! One sync run: pull from remote hosts, then upload what was collected.

use std::sync::Arc;

use tracing::info;

use crate::auth::TokenProvider;
use crate::config::Settings;
use crate::error::{Result, SyncError};
use crate::remote::{PullOutcome, RemotePuller};
use crate::upload::{FolderReport, Uploader};

/// Which steps a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSteps {
    pub pull: bool,
    pub upload: bool,
}

impl SyncSteps {
    pub const ALL: Self = Self {
        pull: true,
        upload: true,
    };
    pub const PULL_ONLY: Self = Self {
        pull: true,
        upload: false,
    };
    pub const UPLOAD_ONLY: Self = Self {
        pull: false,
        upload: true,
    };
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pulls: Vec<PullOutcome>,
    pub uploads: FolderReport,
}

impl SyncReport {
    pub fn failed_pulls(&self) -> usize {
        self.pulls.iter().filter(|p| !p.succeeded()).count()
    }
}

pub struct SyncJob {
    settings: Settings,
    puller: RemotePuller,
    tokens: Option<Arc<TokenProvider>>,
    http: Option<reqwest::Client>,
}

impl SyncJob {
    pub fn new(settings: Settings) -> Self {
        let puller = RemotePuller::new(settings.save_folder.clone());
        Self {
            settings,
            puller,
            tokens: None,
            http: None,
        }
    }

    /// Token provider used by the upload step.
    pub fn with_tokens(mut self, tokens: Arc<TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_puller(mut self, puller: RemotePuller) -> Self {
        self.puller = puller;
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Run the selected steps. Configuration needed by a step is checked
    /// before that step starts.
    pub async fn run(&self, steps: SyncSteps) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        if steps.pull {
            let targets = self.settings.targets()?;
            info!(targets = targets.len(), "Started network sync");
            report.pulls = self.puller.pull_all(targets).await?;
        }

        if steps.upload {
            let folders = self.settings.folders()?;
            let tokens = self.tokens.clone().ok_or(SyncError::NoTokenProvider)?;
            let mut uploader = Uploader::new(tokens);
            if let Some(client) = &self.http {
                uploader = uploader.with_http_client(client.clone());
            }
            report.uploads = uploader
                .upload_all(&self.settings.save_folder, folders)
                .await?;
        }

        info!(
            failed_pulls = report.failed_pulls(),
            uploaded = report.uploads.uploaded.len(),
            skipped = report.uploads.skipped.len(),
            "Sync finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[tokio::test]
    async fn pull_without_targets_is_config_error() {
        let job = SyncJob::new(Settings::default());
        let result = job.run(SyncSteps::PULL_ONLY).await;
        assert!(matches!(
            result,
            Err(SyncError::Config(ConfigError::MissingTargets))
        ));
    }

    #[tokio::test]
    async fn upload_without_folders_is_config_error() {
        let job = SyncJob::new(Settings::default());
        let result = job.run(SyncSteps::UPLOAD_ONLY).await;
        assert!(matches!(
            result,
            Err(SyncError::Config(ConfigError::MissingFolders))
        ));
    }

    #[tokio::test]
    async fn empty_run_reports_nothing() {
        let job = SyncJob::new(Settings::default());
        let report = job
            .run(SyncSteps {
                pull: false,
                upload: false,
            })
            .await
            .unwrap();
        assert_eq!(report, SyncReport::default());
    }
}
