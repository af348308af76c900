use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    polls: AtomicU64,
    dispatched: AtomicU64,
    duplicates: AtomicU64,
    finished: AtomicU64,
    reclaimed: AtomicU64,
}

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub fn record_poll(&self) {
        increment(&self.polls);
    }

    pub fn record_dispatched(&self) {
        increment(&self.dispatched);
    }

    pub fn record_duplicate(&self) {
        increment(&self.duplicates);
    }

    pub fn record_finished(&self) {
        increment(&self.finished);
    }

    pub fn record_reclaimed(&self, count: usize) {
        self.reclaimed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        SchedulerMetricsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerMetricsSnapshot {
    pub polls: u64,
    pub dispatched: u64,
    /// Dispatches skipped because the job was already in flight.
    pub duplicates: u64,
    pub finished: u64,
    pub reclaimed: u64,
}
