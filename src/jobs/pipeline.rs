//! Job orchestrator.
//!
//! [`JobPipeline::run`] executes one job strictly in order:
//!
//! 1. prepare the workspace
//! 2. materialize attachments
//! 3. generate files, then write the license and README
//! 4. publish
//! 5. wait for the site to come up (a timeout is only logged)
//! 6. notify the caller (retried inside the notifier, then swallowed)
//!
//! The first error in steps 1-4 ends the job. [`JobRunner::submit`] runs the
//! pipeline as a detached task behind the dedup registry; nothing that
//! happens inside it, panics included, escapes that task.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::Instrument;

use crate::attachments;
use crate::config::ServiceConfig;
use crate::errors::JobError;
use crate::generate::{ChatCompletionsClient, FileGenerator, GenerationRequest};
use crate::liveness::LivenessPoller;
use crate::notify::Notifier;
use crate::publish::{GitHubPublisher, PublishOutcome, Publisher};
use crate::telemetry::job_span;
use crate::util::sanitize_name;

use super::models::{JobRequest, NotificationPayload};
use super::registry::{Admission, JobRegistry};
use super::workspace::Workspace;

/// Terminal state of a job that reached the publish step.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub publish: PublishOutcome,
    pub live: bool,
    pub notified: bool,
}

/// Everything one job needs, shared by all jobs.
pub struct JobPipeline {
    workspace_root: PathBuf,
    license_holder: String,
    generator: FileGenerator,
    publisher: Arc<dyn Publisher>,
    liveness: LivenessPoller,
    notifier: Notifier,
}

impl JobPipeline {
    pub fn new(
        workspace_root: PathBuf,
        license_holder: String,
        generator: FileGenerator,
        publisher: Arc<dyn Publisher>,
        liveness: LivenessPoller,
        notifier: Notifier,
    ) -> Self {
        Self {
            workspace_root,
            license_holder,
            generator,
            publisher,
            liveness,
            notifier,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let probe_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::new(
            config.workspace_root.clone(),
            config.github.username.clone(),
            FileGenerator::new(Arc::new(ChatCompletionsClient::from_config(&config.llm)?)),
            Arc::new(GitHubPublisher::from_config(&config.github)?),
            LivenessPoller::new(
                probe_client,
                config.liveness_interval(),
                config.liveness_timeout(),
            ),
            Notifier::from_config(&config.notify)?,
        ))
    }

    /// Run one job to completion.
    pub async fn run(&self, request: &JobRequest) -> Result<JobOutcome, JobError> {
        let workspace = Workspace::prepare(&self.workspace_root, request).await?;
        tracing::info!(path = %workspace.path().display(), "Workspace ready");

        let saved = attachments::materialize(&workspace, &request.attachments).await?;

        let existing = if request.is_revision() {
            let snapshot_ws = workspace.clone();
            tokio::task::spawn_blocking(move || snapshot_ws.snapshot())
                .await
                .map_err(|e| JobError::Join(e.to_string()))?
                .map_err(|source| JobError::Workspace {
                    path: workspace.path().to_path_buf(),
                    source,
                })?
        } else {
            Vec::new()
        };

        let files = self
            .generator
            .generate(&GenerationRequest {
                task: request.task.clone(),
                brief: request.brief.clone(),
                round: request.round,
                checks: request.checks.clone(),
                attachments: saved,
                existing,
            })
            .await?;
        for file in &files {
            workspace
                .write_file(&file.relative_path(), file.content.as_bytes())
                .await?;
        }
        workspace
            .write_boilerplate(request, &self.license_holder)
            .await?;
        tracing::info!(files = files.len(), "Wrote generated files");

        let repo_name = sanitize_name(&request.task, 100);
        let publish = self
            .publisher
            .publish(&repo_name, workspace.path(), request.round)
            .await?;
        tracing::info!(
            repo_url = %publish.repo_url,
            commit_sha = %publish.commit_sha,
            pages_url = %publish.pages_url,
            "Published"
        );

        let live = self.liveness.wait_until_live(&publish.pages_url).await;
        if !live {
            tracing::warn!(pages_url = %publish.pages_url, "Continuing without a live site");
        }

        let payload = NotificationPayload {
            email: request.email.clone(),
            task: request.task.clone(),
            round: request.round,
            nonce: request.nonce.clone(),
            repo_url: publish.repo_url.clone(),
            commit_sha: publish.commit_sha.clone(),
            pages_url: publish.pages_url.clone(),
        };
        let notified = match self.notifier.deliver(&request.evaluation_url, &payload).await {
            Ok(receipt) => {
                tracing::info!(attempts = receipt.attempts, "Caller notified");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Caller was not notified");
                false
            }
        };

        Ok(JobOutcome {
            publish,
            live,
            notified,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Body of the detached task. Logs every outcome and never unwinds.
async fn run_detached(pipeline: Arc<JobPipeline>, request: JobRequest) {
    tracing::info!("Job started");
    match AssertUnwindSafe(pipeline.run(&request)).catch_unwind().await {
        Ok(Ok(outcome)) => tracing::info!(
            live = outcome.live,
            notified = outcome.notified,
            "Job finished"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, detail = ?e, "Job failed"),
        Err(panic) => tracing::error!(panic = %panic_message(panic.as_ref()), "Job panicked"),
    }
}

/// Starts jobs in the background, one per dedup key at a time.
#[derive(Clone)]
pub struct JobRunner {
    pipeline: Arc<JobPipeline>,
    registry: JobRegistry,
}

impl JobRunner {
    pub fn new(pipeline: JobPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            registry: JobRegistry::new(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Spawn the job unless one with the same key is still running.
    pub async fn submit(&self, request: JobRequest) -> Admission {
        let key = request.dedup_key();
        let pipeline = Arc::clone(&self.pipeline);
        let admission = self
            .registry
            .admit(key.clone(), move || {
                let span = job_span(&request);
                tokio::spawn(run_detached(pipeline, request).instrument(span))
            })
            .await;

        match admission {
            Admission::Started => tracing::info!(key = %key, "Job accepted"),
            Admission::AlreadyRunning => tracing::info!(key = %key, "Job already in progress"),
        }
        admission
    }
}
