//! Job state, persistence and the escalation protocol.
//!
//! A challenged run gets one silent refresh and one more automated pass. A
//! second challenge, or a refresh that fails, parks the job in `needs_user`
//! until a human clears the challenge and resumes it.

use std::sync::Arc;

use async_trait::async_trait;
use cartwright_core_types::{Chat, Item, Job, JobId, JobReport, JobStatus};
use cartwright_job_store::SharedJobStore;
use cartwright_scheduler::JobExecutor;
use session_engine::SessionFactory;
use tracing::{error, info, warn};

use crate::errors::{CartError, CartResult};
use crate::orchestrator::{BuildOutcome, CartBuild, CartBuilder};
use crate::recovery::SessionRefresher;

pub const NO_ITEMS_ERROR: &str = "No items in list. Add items before building a cart.";

pub struct JobLifecycle {
    store: SharedJobStore,
    sessions: Arc<dyn SessionFactory>,
    refresher: Arc<dyn SessionRefresher>,
    builder: CartBuilder,
}

impl JobLifecycle {
    pub fn new(
        store: SharedJobStore,
        sessions: Arc<dyn SessionFactory>,
        refresher: Arc<dyn SessionRefresher>,
        builder: CartBuilder,
    ) -> Self {
        Self {
            store,
            sessions,
            refresher,
            builder,
        }
    }

    pub fn store(&self) -> &SharedJobStore {
        &self.store
    }

    /// Runs one job to `done`, `failed` or `needs_user` and persists it.
    pub async fn run(&self, mut job: Job) -> JobReport {
        let job_id = job.job_id.clone();

        let (chat, items) = match self.load_inputs(&job).await {
            Ok(inputs) => inputs,
            Err(err) => {
                error!(target: "lifecycle", %job_id, error = %err, "could not load job inputs");
                return self.settle_failed(job, err.to_string(), None).await;
            }
        };

        if items.is_empty() {
            info!(target: "lifecycle", %job_id, "no items; failing without a browser");
            return self.settle_failed(job, NO_ITEMS_ERROR.to_string(), None).await;
        }

        if let Err(err) = job.transition(JobStatus::Running) {
            warn!(target: "lifecycle", %job_id, error = %err, "job not runnable");
            return JobReport::from_job(&job);
        }
        if let Err(err) = self.store.update_job(&job).await {
            error!(target: "lifecycle", %job_id, error = %err, "could not mark job running");
            return JobReport::from_job(&job);
        }
        info!(target: "lifecycle", %job_id, chat_id = %job.chat_id, items = items.len(), "job running");

        match self.attempt(&chat, &items, &job_id).await {
            BuildOutcome::Built(build) => self.settle_done(job, build).await,
            BuildOutcome::Failure { reason, evidence } => {
                self.settle_failed(job, reason, evidence.map(display)).await
            }
            BuildOutcome::Challenge { reason, evidence } => {
                warn!(target: "lifecycle", %job_id, %reason, "challenge detected; trying silent refresh");
                if !self.refresher.refresh().await {
                    warn!(target: "lifecycle", %job_id, "silent refresh failed");
                    return self.settle_needs_user(job, reason, evidence.map(display)).await;
                }
                info!(target: "lifecycle", %job_id, "silent refresh succeeded; retrying build");
                match self.attempt(&chat, &items, &job_id).await {
                    BuildOutcome::Built(build) => self.settle_done(job, build).await,
                    BuildOutcome::Failure { reason, evidence: again } => {
                        let evidence = again.or(evidence);
                        self.settle_failed(job, reason, evidence.map(display)).await
                    }
                    BuildOutcome::Challenge { reason, evidence: again } => {
                        let evidence = again.or(evidence);
                        self.settle_needs_user(job, reason, evidence.map(display)).await
                    }
                }
            }
        }
    }

    /// Moves a `needs_user` job back to `pending` so the scheduler picks it
    /// up. The rerun attempts every item again.
    pub async fn resume(&self, job_id: &JobId) -> CartResult<Job> {
        let mut job = self
            .store
            .job(job_id)
            .await?
            .ok_or_else(|| CartError::JobNotFound(job_id.clone()))?;
        if job.status != JobStatus::NeedsUser {
            return Err(CartError::NotResumable {
                job_id: job_id.clone(),
                status: job.status,
            });
        }
        job.transition(JobStatus::Pending)?;
        job.error = None;
        job.screenshot_path = None;
        self.store.update_job(&job).await?;
        info!(target: "lifecycle", %job_id, "job resumed");
        Ok(job)
    }

    async fn load_inputs(&self, job: &Job) -> CartResult<(Chat, Vec<Item>)> {
        let chat = self.store.ensure_chat(&job.chat_id).await?;
        let items = self.store.items(&job.chat_id).await?;
        Ok((chat, items))
    }

    async fn attempt(&self, chat: &Chat, items: &[Item], job_id: &JobId) -> BuildOutcome {
        let session = match self.sessions.open().await {
            Ok(session) => session,
            Err(err) => {
                return BuildOutcome::Failure {
                    reason: format!("browser session failed to start: {err}"),
                    evidence: None,
                }
            }
        };
        let outcome = self.builder.build(session.as_ref(), chat, items, job_id).await;
        session.close().await;
        outcome
    }

    async fn settle_done(&self, mut job: Job, build: CartBuild) -> JobReport {
        let job_id = job.job_id.clone();
        job.result_url = Some(build.cart_url.clone());
        job.error = None;
        job.screenshot_path = build.screenshot.map(display);
        self.persist(&mut job, JobStatus::Done).await;
        info!(
            target: "lifecycle",
            %job_id,
            added = build.added.len(),
            failed = build.failed.len(),
            "job done"
        );
        let mut report = JobReport::from_job(&job);
        report.added = build.added;
        report.failed = build.failed;
        report
    }

    async fn settle_failed(&self, mut job: Job, reason: String, evidence: Option<String>) -> JobReport {
        error!(target: "lifecycle", job_id = %job.job_id, %reason, "job failed");
        job.error = Some(reason);
        job.screenshot_path = evidence;
        self.persist(&mut job, JobStatus::Failed).await;
        JobReport::from_job(&job)
    }

    async fn settle_needs_user(
        &self,
        mut job: Job,
        reason: String,
        evidence: Option<String>,
    ) -> JobReport {
        warn!(target: "lifecycle", job_id = %job.job_id, %reason, "job needs the user");
        job.error = Some(needs_user_message(&job.job_id, &reason));
        job.screenshot_path = evidence;
        self.persist(&mut job, JobStatus::NeedsUser).await;
        JobReport::from_job(&job)
    }

    async fn persist(&self, job: &mut Job, status: JobStatus) {
        if let Err(err) = job.transition(status) {
            error!(target: "lifecycle", job_id = %job.job_id, error = %err, "refusing transition");
            return;
        }
        if let Err(err) = self.store.update_job(job).await {
            error!(target: "lifecycle", job_id = %job.job_id, error = %err, "could not persist job");
        }
    }
}

#[async_trait]
impl JobExecutor for JobLifecycle {
    async fn execute(&self, job: Job) -> JobReport {
        self.run(job).await
    }
}

/// Error text for a parked job, with what the user should do next.
pub fn needs_user_message(job_id: &JobId, reason: &str) -> String {
    format!(
        "The store asked for a verification check ({reason}) and the automatic \
         refresh did not clear it. Run `cartwright resume {job_id}`, complete the \
         check in the browser window that opens, then press ENTER to retry the job."
    )
}

fn display(path: std::path::PathBuf) -> String {
    path.display().to_string()
}
