//! Which jobs are running in this process and who is waiting on them.

use std::sync::Arc;
use std::time::Instant;

use cartwright_core_types::{JobId, JobReport};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    in_flight: DashMap<JobId, Instant>,
    waiters: DashMap<JobId, Vec<oneshot::Sender<JobReport>>>,
}

/// Shared between the scheduler, the lifecycle and the control plane. Clones
/// share state; separate registries are fully isolated.
#[derive(Clone, Debug, Default)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

/// Holds a job's in-flight flag. Dropping it clears the flag, so a panicking
/// run cannot wedge the job.
#[derive(Debug)]
pub struct Claim {
    job_id: JobId,
    inner: Arc<Inner>,
}

impl Claim {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.inner.in_flight.remove(&self.job_id);
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the job in flight. `None` when it already is.
    pub fn try_claim(&self, job_id: &JobId) -> Option<Claim> {
        match self.inner.in_flight.entry(job_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(Claim {
                    job_id: job_id.clone(),
                    inner: Arc::clone(&self.inner),
                })
            }
        }
    }

    pub fn is_in_flight(&self, job_id: &JobId) -> bool {
        self.inner.in_flight.contains_key(job_id)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Resolves with the report of the job's next finished run.
    pub fn subscribe(&self, job_id: &JobId) -> oneshot::Receiver<JobReport> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .waiters
            .entry(job_id.clone())
            .or_default()
            .push(tx);
        rx
    }

    /// Delivers `report` to everyone subscribed for this run. Waiters are
    /// removed before delivery, so each fires at most once.
    pub fn complete(&self, report: &JobReport) -> usize {
        let Some((_, waiters)) = self.inner.waiters.remove(&report.job_id) else {
            return 0;
        };
        let mut delivered = 0;
        for waiter in waiters {
            if waiter.send(report.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(
            target: "scheduler",
            job_id = %report.job_id,
            status = %report.status,
            delivered,
            "completion delivered"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartwright_core_types::{ChatId, Job, JobStatus};

    fn report(job_id: &JobId, status: JobStatus) -> JobReport {
        let mut job = Job::new(ChatId::new("1"));
        job.job_id = job_id.clone();
        job.status = status;
        JobReport::from_job(&job)
    }

    #[test]
    fn second_claim_is_refused_until_release() {
        let registry = JobRegistry::new();
        let id = JobId::from("abcd1234");
        let claim = registry.try_claim(&id).unwrap();
        assert!(registry.try_claim(&id).is_none());
        assert!(registry.is_in_flight(&id));
        drop(claim);
        assert!(!registry.is_in_flight(&id));
        assert!(registry.try_claim(&id).is_some());
    }

    #[test]
    fn clones_share_state() {
        let registry = JobRegistry::new();
        let other = registry.clone();
        let id = JobId::from("00000001");
        let _claim = registry.try_claim(&id).unwrap();
        assert!(other.try_claim(&id).is_none());
        assert!(JobRegistry::new().try_claim(&id).is_some());
    }

    #[tokio::test]
    async fn completion_fires_once() {
        let registry = JobRegistry::new();
        let id = JobId::from("feedbeef");
        let first = registry.subscribe(&id);
        let second = registry.subscribe(&id);

        assert_eq!(registry.complete(&report(&id, JobStatus::Done)), 2);
        assert_eq!(registry.complete(&report(&id, JobStatus::Done)), 0);
        assert_eq!(first.await.unwrap().status, JobStatus::Done);
        assert_eq!(second.await.unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn subscribers_after_completion_wait_for_the_next_run() {
        let registry = JobRegistry::new();
        let id = JobId::from("12345678");
        registry.complete(&report(&id, JobStatus::NeedsUser));
        let mut later = registry.subscribe(&id);
        assert!(later.try_recv().is_err());
        registry.complete(&report(&id, JobStatus::Done));
        assert_eq!(later.await.unwrap().status, JobStatus::Done);
    }
}
