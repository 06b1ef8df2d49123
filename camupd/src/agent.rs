use std::io;
use std::sync::Arc;
use std::time::Instant;

use camup_core::{RemoteClient, RemoteError};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::storage::{StorageError, TokenStorage};
use crate::sync::destination::DestinationResolver;
use crate::sync::driver::{DriverOutcome, DriverReport, UploadDriver};
use crate::sync::media::{DirectoryLibrary, MediaLibrary};
use crate::sync::progress::{ProgressError, ProgressStore, SettingsStore};
use crate::sync::session::{BootstrapError, RemoteSession, SessionOptions};
use crate::sync::staging::WorkingDir;

/// Failures that end an invocation before any item is considered.
#[derive(Debug, Error)]
pub enum InvocationAbort {
    #[error("credential unavailable: {0}")]
    Credential(#[from] StorageError),
    #[error("remote client setup failed: {0}")]
    Client(#[from] RemoteError),
    #[error("session bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("working directory unavailable: {0}")]
    WorkingDir(#[from] io::Error),
    #[error("progress store unavailable: {0}")]
    Progress(#[from] ProgressError),
}

#[derive(Debug)]
pub enum InvocationOutcome {
    Finished(DriverReport),
    Aborted(InvocationAbort),
}

impl InvocationOutcome {
    /// `false` when the run stopped on a failure the next run has to retry.
    pub fn is_success(&self) -> bool {
        match self {
            InvocationOutcome::Finished(report) => {
                !matches!(report.outcome, DriverOutcome::Aborted(_))
            }
            InvocationOutcome::Aborted(_) => false,
        }
    }
}

/// One scheduler-triggered run of the camera upload.
pub struct Agent {
    config: AgentConfig,
    library: Arc<dyn MediaLibrary>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        let library: Arc<dyn MediaLibrary> =
            Arc::new(DirectoryLibrary::new(config.media_root.clone()));
        Self { config, library }
    }

    /// Reads the saved credential and runs a full invocation. Never fails: every
    /// error is folded into the returned outcome.
    pub async fn run_once(&self) -> InvocationOutcome {
        let token = match TokenStorage::new().and_then(|storage| storage.get_token()) {
            Ok(token) => token,
            Err(err) => return self.finish(InvocationOutcome::Aborted(err.into())),
        };
        self.run_with_token(token).await
    }

    pub async fn run_with_token(&self, token: String) -> InvocationOutcome {
        let outcome = match self.invoke(token).await {
            Ok(report) => InvocationOutcome::Finished(report),
            Err(abort) => InvocationOutcome::Aborted(abort),
        };
        self.finish(outcome)
    }

    async fn invoke(&self, token: String) -> Result<DriverReport, InvocationAbort> {
        let deadline = Instant::now() + self.config.time_budget;
        let client = RemoteClient::with_base_url(&self.config.api_url, token)?;
        let mut session = RemoteSession::bootstrap(
            client,
            &SessionOptions {
                remote_root: self.config.remote_root.clone(),
                page_size: self.config.page_size,
            },
        )
        .await?;
        info!(
            nodes = session.tree().len(),
            used_space = session.account().used_space,
            total_space = session.account().total_space,
            "remote tree fetched"
        );

        let working_dir = WorkingDir::new(self.config.working_dir());
        let leftovers = working_dir.prepare().await?;
        if leftovers > 0 {
            warn!(leftovers, "removed staged copies from an interrupted run");
        }
        let progress = ProgressStore::new(SettingsStore::open(&self.config.progress_db()).await?);

        let resolver = DestinationResolver::new(
            self.config.destination.clone(),
            self.config.settle_base,
            self.config.settle_max,
            self.config.settle_attempts,
        )
        .with_deadline(deadline);
        let destination = resolver.resolve(&mut session).await;
        if destination.is_none() {
            warn!(folder = resolver.name(), "uploads disabled for this run");
        }

        let report = UploadDriver::new(
            &mut session,
            destination,
            Arc::clone(&self.library),
            &working_dir,
            &progress,
        )
        .with_deadline(deadline)
        .run()
        .await;
        Ok(report)
    }

    fn finish(&self, outcome: InvocationOutcome) -> InvocationOutcome {
        match &outcome {
            InvocationOutcome::Finished(report) => {
                let summary = match &report.outcome {
                    DriverOutcome::Completed => "completed",
                    DriverOutcome::BudgetExhausted => "time budget exhausted",
                    DriverOutcome::Aborted(_) => "aborted",
                };
                info!(
                    uploaded = report.uploaded,
                    duplicates = report.skipped_duplicate,
                    unstaged = report.skipped_unstaged,
                    no_destination = report.skipped_no_destination,
                    watermark = %report.watermark,
                    "invocation {summary}"
                );
                if let DriverOutcome::Aborted(reason) = &report.outcome {
                    error!("upload pass stopped: {reason}");
                }
            }
            InvocationOutcome::Aborted(reason) => error!("invocation aborted: {reason}"),
        }
        outcome
    }
}
