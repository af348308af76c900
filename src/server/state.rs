use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cartwright_scheduler::Scheduler;
use parking_lot::Mutex;

use crate::ingest::ChatDesk;
use crate::lifecycle::JobLifecycle;

#[derive(Clone)]
pub struct ServeState {
    pub(crate) desk: ChatDesk,
    pub(crate) lifecycle: Arc<JobLifecycle>,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) health: Arc<ServeHealth>,
}

impl ServeState {
    pub fn new(desk: ChatDesk, lifecycle: Arc<JobLifecycle>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            desk,
            lifecycle,
            scheduler,
            health: Arc::new(ServeHealth::new()),
        }
    }

    pub fn health(&self) -> &Arc<ServeHealth> {
        &self.health
    }
}

pub struct HealthSnapshot {
    pub live: bool,
    pub ready: bool,
    pub last_error: Option<String>,
}

#[derive(Default)]
pub struct ServeHealth {
    live: AtomicBool,
    ready: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl ServeHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_live(&self) {
        self.live.store(true, Ordering::SeqCst);
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        *self.last_error.lock() = None;
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.ready.store(false, Ordering::SeqCst);
        *self.last_error.lock() = Some(error.into());
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            live: self.live.load(Ordering::SeqCst),
            ready: self.ready.load(Ordering::SeqCst),
            last_error: self.last_error.lock().clone(),
        }
    }
}
