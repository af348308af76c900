use std::sync::Arc;
use std::time::Duration;

use cartwright_core_types::{Job, JobId, JobReport, JobStatus};
use cartwright_job_store::SharedJobStore;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::SchedulerError;
use crate::executor::JobExecutor;
use crate::metrics::{Counters, SchedulerMetricsSnapshot};
use crate::registry::JobRegistry;

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// Upper bound on concurrently executing jobs; `0` means unbounded.
    pub max_concurrent: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_concurrent: 4,
        }
    }
}

/// Polls the store for pending jobs and runs each as its own task. The store
/// is polled, not leased: the registry's in-flight flag is what keeps a job
/// from running twice in this process.
pub struct Scheduler {
    store: SharedJobStore,
    executor: Arc<dyn JobExecutor>,
    registry: JobRegistry,
    config: SchedulerConfig,
    slots: Option<Arc<Semaphore>>,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        store: SharedJobStore,
        executor: Arc<dyn JobExecutor>,
        registry: JobRegistry,
        config: SchedulerConfig,
    ) -> Self {
        let slots = (config.max_concurrent > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent)));
        Self {
            store,
            executor,
            registry,
            config,
            slots,
            counters: Arc::new(Counters::default()),
            worker: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn metrics(&self) -> SchedulerMetricsSnapshot {
        self.counters.snapshot()
    }

    /// Starts executing `job` in the background.
    pub fn dispatch(&self, job: Job) -> Result<JoinHandle<JobReport>, SchedulerError> {
        let Some(claim) = self.registry.try_claim(&job.job_id) else {
            self.counters.record_duplicate();
            return Err(SchedulerError::AlreadyRunning(job.job_id));
        };
        self.counters.record_dispatched();
        let executor = Arc::clone(&self.executor);
        let registry = self.registry.clone();
        let counters = Arc::clone(&self.counters);
        let slots = self.slots.clone();
        Ok(tokio::spawn(async move {
            let _permit = match slots {
                Some(slots) => slots.acquire_owned().await.ok(),
                None => None,
            };
            info!(target: "scheduler", job_id = %job.job_id, chat_id = %job.chat_id, "job dispatched");
            let report = executor.execute(job).await;
            drop(claim);
            counters.record_finished();
            registry.complete(&report);
            report
        }))
    }

    /// One poll: dispatches every pending job not already in flight.
    pub async fn tick(&self) -> Result<usize, SchedulerError> {
        self.counters.record_poll();
        let mut dispatched = 0;
        for job in self.store.pending_jobs().await? {
            if self.registry.is_in_flight(&job.job_id) {
                continue;
            }
            if self.dispatch(job).is_ok() {
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    /// Runs one pending job now and waits for its report.
    pub async fn run_job(&self, job_id: &JobId) -> Result<JobReport, SchedulerError> {
        let job = self
            .store
            .job(job_id)
            .await?
            .ok_or_else(|| SchedulerError::UnknownJob(job_id.clone()))?;
        if job.status != JobStatus::Pending {
            return Err(SchedulerError::NotPending {
                job_id: job.job_id,
                status: job.status.to_string(),
            });
        }
        self.dispatch(job)?
            .await
            .map_err(|err| SchedulerError::Aborted(err.to_string()))
    }

    /// Returns jobs left `running` by a previous process to `pending`.
    pub async fn reclaim_abandoned(&self) -> Result<usize, SchedulerError> {
        let mut reclaimed = 0;
        for mut job in self.store.jobs_with_status(JobStatus::Running).await? {
            if self.registry.is_in_flight(&job.job_id) {
                continue;
            }
            job.transition(JobStatus::Pending)?;
            self.store.update_job(&job).await?;
            warn!(target: "scheduler", job_id = %job.job_id, "reclaimed abandoned job");
            reclaimed += 1;
        }
        self.counters.record_reclaimed(reclaimed);
        Ok(reclaimed)
    }

    /// Starts the poll loop once; later calls are no-ops.
    pub async fn spawn(self: &Arc<Self>) -> Result<(), SchedulerError> {
        if self.worker.lock().is_some() {
            return Ok(());
        }
        self.reclaim_abandoned().await?;
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(this.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = this.tick().await {
                    warn!(target: "scheduler", error = %err, "poll failed");
                }
            }
        });
        let mut worker = self.worker.lock();
        match worker.as_ref() {
            Some(_) => handle.abort(),
            None => *worker = Some(handle),
        }
        info!(
            target: "scheduler",
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "scheduler started"
        );
        Ok(())
    }

    /// Stops polling. Jobs already dispatched keep running.
    pub fn stop(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
            info!(target: "scheduler", "scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}
