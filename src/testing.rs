//! Scripted stand-ins for the browser side of a job.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cartwright_core_types::{CandidateProduct, Item, Outcome};
use parking_lot::Mutex;
use session_engine::{CartSession, ProductRef, SessionError, SessionFactory};

use crate::recovery::SessionRefresher;

pub fn product(title: &str, brand: &str, price: Option<f64>) -> CandidateProduct {
    CandidateProduct {
        title: title.into(),
        brand: brand.into(),
        price,
        url: format!("https://www.shop.test/en/ip/{}", title.replace(' ', "-")),
        ..CandidateProduct::default()
    }
}

#[derive(Default)]
struct Script {
    log: Vec<String>,
    results: HashMap<String, Vec<CandidateProduct>>,
    never_adds: HashSet<String>,
    search_challenges: HashMap<String, usize>,
    searches: HashMap<String, usize>,
    warm_up: Option<Outcome<()>>,
    current: Option<String>,
}

/// Records every call. Clones share one script.
#[derive(Clone, Default)]
pub struct ScriptedSession {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, item: &str, results: Vec<CandidateProduct>) -> Self {
        self.script.lock().results.insert(item.into(), results);
        self
    }

    pub fn never_adds(self, item: &str) -> Self {
        self.script.lock().never_adds.insert(item.into());
        self
    }

    /// Challenges the `nth` search (1-based) for `item`.
    pub fn challenge_on_search(self, item: &str, nth: usize) -> Self {
        self.script.lock().search_challenges.insert(item.into(), nth);
        self
    }

    pub fn challenging_warm_up(self, reason: &str) -> Self {
        self.script.lock().warm_up = Some(Outcome::Challenge(reason.into()));
        self
    }

    pub fn failing_warm_up(self, reason: &str) -> Self {
        self.script.lock().warm_up = Some(Outcome::Failure(reason.into()));
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.script.lock().log.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.script
            .lock()
            .log
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    fn record(&self, entry: String) {
        self.script.lock().log.push(entry);
    }
}

#[async_trait]
impl CartSession for ScriptedSession {
    async fn warm_up(&self) -> Outcome<()> {
        self.record("warm_up".into());
        self.script.lock().warm_up.clone().unwrap_or(Outcome::Success(()))
    }

    async fn set_location(&self, postal_code: &str) -> Option<()> {
        self.record(format!("set_location {postal_code}"));
        Some(())
    }

    async fn search(&self, item: &Item) -> Outcome<Vec<CandidateProduct>> {
        self.record(format!("search {}", item.name));
        let mut script = self.script.lock();
        let seen = script.searches.entry(item.name.clone()).or_default();
        *seen += 1;
        let seen = *seen;
        if script.search_challenges.get(&item.name) == Some(&seen) {
            return Outcome::Challenge("captcha".into());
        }
        script.current = Some(item.name.clone());
        let results = script
            .results
            .get(&item.name)
            .cloned()
            .unwrap_or_else(|| vec![product(&item.name, "Brand", Some(3.0))]);
        Outcome::Success(results)
    }

    async fn add_to_cart(&self, target: ProductRef) -> Outcome<bool> {
        let label = match &target {
            ProductRef::Url(_) => "Url",
            ProductRef::ResultsPage => "ResultsPage",
            ProductRef::FirstResultLink => "FirstResultLink",
        };
        self.record(format!("add_to_cart {label}"));
        let script = self.script.lock();
        let blocked = script
            .current
            .as_ref()
            .map(|item| script.never_adds.contains(item))
            .unwrap_or(false);
        Outcome::Success(!blocked)
    }

    async fn update_quantity(&self, quantity: u32) -> Option<()> {
        self.record(format!("update_quantity {quantity}"));
        Some(())
    }

    async fn open_cart(&self) -> Outcome<String> {
        self.record("open_cart".into());
        Outcome::Success("https://www.shop.test/en/cart".into())
    }

    async fn detect_challenge(&self) -> Outcome<()> {
        Outcome::Success(())
    }

    async fn capture_evidence(&self, job_id: &str) -> Option<PathBuf> {
        self.record("capture_evidence".into());
        Some(PathBuf::from(format!("/tmp/shots/{job_id}.png")))
    }

    async fn close(&self) {
        self.record("close".into());
    }
}

/// Hands out queued sessions, then fresh default ones.
#[derive(Default)]
pub struct ScriptedFactory {
    queue: Mutex<VecDeque<ScriptedSession>>,
    opened: AtomicUsize,
    refuse: bool,
}

impl ScriptedFactory {
    pub fn new(sessions: Vec<ScriptedSession>) -> Self {
        Self {
            queue: Mutex::new(sessions.into()),
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(&self) -> Result<Box<dyn CartSession>, SessionError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(SessionError::Config("browser missing".into()));
        }
        let session = self.queue.lock().pop_front().unwrap_or_default();
        Ok(Box::new(session))
    }
}

pub struct StubRefresher {
    succeed: bool,
    calls: AtomicUsize,
}

impl StubRefresher {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRefresher for StubRefresher {
    async fn refresh(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.succeed
    }
}
