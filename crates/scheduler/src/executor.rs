use async_trait::async_trait;
use cartwright_core_types::{Job, JobReport};

/// Runs one dispatched job to the end of its run. Implementations own every
/// status transition and must not return until the job has left `running`.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: Job) -> JobReport;
}
