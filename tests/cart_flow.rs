//! End-to-end job runs over fake browser sessions.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cartwright::config::AppConfig;
use cartwright::{CartError, SessionRefresher, Services};
use cartwright_core_types::{CandidateProduct, ChatId, Item, JobStatus, Outcome};
use cartwright_job_store::{JobStore, LocalJobStore, SharedJobStore};
use cartwright_scheduler::SchedulerError;
use parking_lot::Mutex;
use session_engine::{CartSession, EngineConfig, ProductRef, SessionError, SessionFactory};
use stealth::StealthRuntime;

#[derive(Clone, Copy, Default)]
enum Behaviour {
    #[default]
    Shops,
    ChallengesOnSearch,
    Slow,
}

#[derive(Default)]
struct Shopper {
    behaviour: Behaviour,
    added: Arc<Mutex<Vec<String>>>,
    current: Mutex<Option<String>>,
}

#[async_trait]
impl CartSession for Shopper {
    async fn warm_up(&self) -> Outcome<()> {
        if let Behaviour::Slow = self.behaviour {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Outcome::Success(())
    }

    async fn set_location(&self, _postal_code: &str) -> Option<()> {
        Some(())
    }

    async fn search(&self, item: &Item) -> Outcome<Vec<CandidateProduct>> {
        if let Behaviour::ChallengesOnSearch = self.behaviour {
            return Outcome::Challenge("press and hold".into());
        }
        *self.current.lock() = Some(item.name.clone());
        Outcome::Success(vec![
            CandidateProduct {
                title: format!("Premium {}", item.name),
                brand: "Fancy".into(),
                price: Some(9.99),
                url: format!("https://www.shop.test/en/ip/premium-{}", item.name),
                ..CandidateProduct::default()
            },
            CandidateProduct {
                title: item.name.clone(),
                brand: "Value".into(),
                price: Some(3.49),
                url: format!("https://www.shop.test/en/ip/{}", item.name),
                ..CandidateProduct::default()
            },
        ])
    }

    async fn add_to_cart(&self, _target: ProductRef) -> Outcome<bool> {
        if let Some(name) = self.current.lock().clone() {
            self.added.lock().push(name);
        }
        Outcome::Success(true)
    }

    async fn update_quantity(&self, _quantity: u32) -> Option<()> {
        Some(())
    }

    async fn open_cart(&self) -> Outcome<String> {
        Outcome::Success("https://www.shop.test/en/cart".into())
    }

    async fn detect_challenge(&self) -> Outcome<()> {
        Outcome::Success(())
    }

    async fn capture_evidence(&self, job_id: &str) -> Option<PathBuf> {
        Some(PathBuf::from(format!("/tmp/cartwright-evidence/{job_id}.png")))
    }

    async fn close(&self) {}
}

#[derive(Default)]
struct Browser {
    queue: Mutex<VecDeque<Behaviour>>,
    fallback: Behaviour,
    opened: AtomicUsize,
    added: Arc<Mutex<Vec<String>>>,
}

impl Browser {
    fn scripted(queue: Vec<Behaviour>, fallback: Behaviour) -> Self {
        Self {
            queue: Mutex::new(queue.into()),
            fallback,
            ..Self::default()
        }
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for Browser {
    async fn open(&self) -> Result<Box<dyn CartSession>, SessionError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.queue.lock().pop_front().unwrap_or(self.fallback);
        Ok(Box::new(Shopper {
            behaviour,
            added: self.added.clone(),
            current: Mutex::new(None),
        }))
    }
}

struct Refresher {
    succeed: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl SessionRefresher for Refresher {
    async fn refresh(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.succeed
    }
}

struct Rig {
    services: Services,
    store: SharedJobStore,
    browser: Arc<Browser>,
    refresher: Arc<Refresher>,
}

fn rig(browser: Browser, refresh_succeeds: bool) -> Rig {
    let mut config = AppConfig::default();
    config.retry.backoff_min_ms = 0;
    config.retry.backoff_max_ms = 0;
    let store: SharedJobStore = Arc::new(LocalJobStore::in_memory());
    let browser = Arc::new(browser);
    let refresher = Arc::new(Refresher {
        succeed: refresh_succeeds,
        calls: AtomicUsize::new(0),
    });
    let services = Services::assemble(
        &config,
        store.clone(),
        browser.clone(),
        refresher.clone(),
        EngineConfig::default(),
        Arc::new(StealthRuntime::new()),
    );
    Rig {
        services,
        store,
        browser,
        refresher,
    }
}

#[tokio::test]
async fn grocery_list_becomes_a_cart() {
    let rig = rig(Browser::default(), true);
    let chat = ChatId::new("42");
    let items = rig
        .services
        .desk
        .add_items(&chat, "milk x2\neggs (max $5)")
        .await
        .unwrap();
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[1].max_price, Some(5.0));

    let job = rig.services.desk.create_job(&chat).await.unwrap();
    let report = rig.services.scheduler.run_job(&job.job_id).await.unwrap();

    assert_eq!(report.status, JobStatus::Done);
    assert_eq!(report.added, vec!["milk", "eggs"]);
    assert!(report.failed.is_empty());
    assert_eq!(report.result_url.as_deref(), Some("https://www.shop.test/en/cart"));
    assert_eq!(*rig.browser.added.lock(), vec!["milk", "eggs"]);

    let stored = rig.services.desk.job(&job.job_id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Done);
}

#[tokio::test]
async fn empty_list_fails_without_a_browser() {
    let rig = rig(Browser::default(), true);
    let chat = ChatId::new("7");

    let err = rig.services.desk.create_job(&chat).await.unwrap_err();
    assert!(matches!(err, CartError::NoItems(_)));

    // A job queued directly against an empty chat still settles cleanly.
    let job = rig.store.create_job(&chat).await.unwrap();
    let report = rig.services.scheduler.run_job(&job.job_id).await.unwrap();
    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.error.is_some());
    assert_eq!(rig.browser.opened(), 0);
}

#[tokio::test]
async fn challenge_cleared_by_silent_refresh() {
    let browser = Browser::scripted(vec![Behaviour::ChallengesOnSearch], Behaviour::Shops);
    let rig = rig(browser, true);
    let chat = ChatId::new("9");
    rig.store
        .add_items(&chat, vec![Item::new("bread", 1)])
        .await
        .unwrap();
    let job = rig.services.desk.create_job(&chat).await.unwrap();

    let report = rig.services.scheduler.run_job(&job.job_id).await.unwrap();

    assert_eq!(report.status, JobStatus::Done);
    assert_eq!(report.added, vec!["bread"]);
    assert_eq!(rig.refresher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.browser.opened(), 2);
}

#[tokio::test]
async fn persistent_challenge_escalates_once() {
    let rig = rig(Browser::scripted(vec![], Behaviour::ChallengesOnSearch), true);
    let chat = ChatId::new("11");
    rig.store
        .add_items(&chat, vec![Item::new("bread", 1)])
        .await
        .unwrap();
    let job = rig.services.desk.create_job(&chat).await.unwrap();

    let report = rig.services.scheduler.run_job(&job.job_id).await.unwrap();

    assert_eq!(report.status, JobStatus::NeedsUser);
    assert!(report.screenshot_path.is_some());
    assert!(report
        .error
        .as_deref()
        .unwrap()
        .contains(&format!("cartwright resume {}", job.job_id)));
    assert_eq!(rig.refresher.calls.load(Ordering::SeqCst), 1);

    // Nothing picks it up again until the user resumes it.
    assert_eq!(rig.services.scheduler.tick().await.unwrap(), 0);

    let resumed = rig.services.lifecycle.resume(&job.job_id).await.unwrap();
    assert_eq!(resumed.status, JobStatus::Pending);
    assert!(resumed.screenshot_path.is_none());
}

#[tokio::test]
async fn duplicate_dispatch_runs_once() {
    let rig = rig(Browser::scripted(vec![], Behaviour::Slow), true);
    let chat = ChatId::new("5");
    rig.store
        .add_items(&chat, vec![Item::new("rice", 1)])
        .await
        .unwrap();
    let job = rig.services.desk.create_job(&chat).await.unwrap();

    let first = rig.services.scheduler.dispatch(job.clone()).unwrap();
    let second = rig.services.scheduler.dispatch(job.clone());
    assert!(matches!(second, Err(SchedulerError::AlreadyRunning(_))));
    assert_eq!(rig.services.registry.in_flight(), 1);

    let report = first.await.unwrap();
    assert_eq!(report.status, JobStatus::Done);
    assert_eq!(rig.browser.opened(), 1);

    let metrics = rig.services.scheduler.metrics();
    assert_eq!(metrics.dispatched, 1);
    assert_eq!(metrics.duplicates, 1);
    assert_eq!(rig.services.registry.in_flight(), 0);
}
