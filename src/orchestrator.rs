//! Drives one session through a chat's shopping list.
//!
//! Items run strictly in list order. Each gets a bounded number of attempts
//! with a randomized pause between them; a challenge on any step ends the
//! whole build at once, since challenges belong to the session rather than
//! the item.

use std::path::PathBuf;
use std::time::Duration;

use cartwright_core_types::{CandidateProduct, Chat, Item, JobId, Outcome};
use product_selector::ProductSelector;
use rand::Rng;
use session_engine::{CartSession, ProductRef};
use tracing::{debug, info, warn};

use crate::config::RetrySettings;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        let min = settings.backoff_min_ms.min(settings.backoff_max_ms);
        Self {
            attempts: settings.attempts.max(1),
            backoff_min: Duration::from_millis(min),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> Duration {
        if self.backoff_max <= self.backoff_min {
            return self.backoff_min;
        }
        rand::thread_rng().gen_range(self.backoff_min..=self.backoff_max)
    }
}

/// A build that ran to the cart page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CartBuild {
    pub cart_url: String,
    pub added: Vec<String>,
    pub failed: Vec<String>,
    /// Taken when at least one item failed.
    pub screenshot: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BuildOutcome {
    Built(CartBuild),
    Challenge {
        reason: String,
        evidence: Option<PathBuf>,
    },
    Failure {
        reason: String,
        evidence: Option<PathBuf>,
    },
}

impl BuildOutcome {
    pub fn is_challenge(&self) -> bool {
        matches!(self, BuildOutcome::Challenge { .. })
    }
}

#[derive(Clone, Default)]
pub struct CartBuilder {
    selector: ProductSelector,
    retry: RetryPolicy,
}

impl CartBuilder {
    pub fn new(selector: ProductSelector, retry: RetryPolicy) -> Self {
        Self { selector, retry }
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Runs the full flow on an open session. The caller owns and closes it.
    pub async fn build(
        &self,
        session: &dyn CartSession,
        chat: &Chat,
        items: &[Item],
        job_id: &JobId,
    ) -> BuildOutcome {
        info!(target: "orchestrator", %job_id, items = items.len(), "starting cart build");

        match session.warm_up().await {
            Outcome::Success(()) => {}
            Outcome::Challenge(reason) => return challenged(session, job_id, reason).await,
            Outcome::Failure(reason) => return failed(session, job_id, reason).await,
        }

        if let Some(postal_code) = chat.postal_code.as_deref().filter(|p| !p.trim().is_empty()) {
            if session.set_location(postal_code).await.is_none() {
                warn!(target: "orchestrator", %job_id, "location not set; continuing with site default");
            }
        }

        let mut added = Vec::new();
        let mut missed = Vec::new();
        for item in items {
            let label = item.label();
            match self.add_with_retry(session, item).await {
                Outcome::Success(true) => {
                    info!(target: "orchestrator", %job_id, item = %label, "item added");
                    added.push(label);
                }
                Outcome::Success(false) | Outcome::Failure(_) => {
                    warn!(target: "orchestrator", %job_id, item = %label, "item failed");
                    missed.push(label);
                }
                Outcome::Challenge(reason) => return challenged(session, job_id, reason).await,
            }
        }

        info!(
            target: "orchestrator",
            %job_id,
            added = added.len(),
            failed = missed.len(),
            "cart build complete"
        );

        let cart_url = match session.open_cart().await {
            Outcome::Success(url) => url,
            Outcome::Challenge(reason) => return challenged(session, job_id, reason).await,
            Outcome::Failure(reason) => return failed(session, job_id, reason).await,
        };

        let screenshot = if missed.is_empty() {
            None
        } else {
            session.capture_evidence(job_id.as_str()).await
        };

        BuildOutcome::Built(CartBuild {
            cart_url,
            added,
            failed: missed,
            screenshot,
        })
    }

    /// `Success(false)` once every attempt came up empty.
    pub async fn add_with_retry(&self, session: &dyn CartSession, item: &Item) -> Outcome<bool> {
        let label = item.label();
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.add_item(session, item).await {
                Outcome::Success(true) => return Outcome::Success(true),
                Outcome::Challenge(reason) => return Outcome::Challenge(reason),
                Outcome::Success(false) => {
                    info!(target: "orchestrator", item = %label, attempt, max = attempts, "item not added");
                }
                Outcome::Failure(reason) => {
                    warn!(target: "orchestrator", item = %label, attempt, max = attempts, error = %reason, "attempt failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.retry.backoff()).await;
            }
        }
        Outcome::Success(false)
    }

    /// One attempt: search, choose, then add through the fallback chain.
    pub async fn add_item(&self, session: &dyn CartSession, item: &Item) -> Outcome<bool> {
        let candidates = match session.search(item).await {
            Outcome::Success(candidates) => candidates,
            Outcome::Challenge(reason) => return Outcome::Challenge(reason),
            Outcome::Failure(reason) => return Outcome::Failure(reason),
        };

        if !candidates.is_empty() {
            let Some(idx) = self.selector.choose(&candidates, item).await else {
                info!(target: "orchestrator", item = %item.label(), scraped = candidates.len(), "no candidate qualifies");
                return Outcome::Success(false);
            };
            let chosen = &candidates[idx];
            log_choice(item, chosen);
            if !chosen.url.is_empty() {
                match self.add_and_size(session, item, ProductRef::Url(chosen.url.clone())).await {
                    Outcome::Success(false) => {}
                    other => return other,
                }
            }
        }

        for fallback in [ProductRef::ResultsPage, ProductRef::FirstResultLink] {
            debug!(target: "orchestrator", item = %item.label(), ?fallback, "trying fallback");
            match self.add_and_size(session, item, fallback).await {
                Outcome::Success(false) => {}
                other => return other,
            }
        }
        Outcome::Success(false)
    }

    async fn add_and_size(
        &self,
        session: &dyn CartSession,
        item: &Item,
        target: ProductRef,
    ) -> Outcome<bool> {
        match session.add_to_cart(target).await {
            Outcome::Success(true) => {
                if item.quantity > 1 && session.update_quantity(item.quantity).await.is_none() {
                    debug!(target: "orchestrator", item = %item.label(), quantity = item.quantity, "quantity left at 1");
                }
                Outcome::Success(true)
            }
            other => other,
        }
    }
}

fn log_choice(item: &Item, chosen: &CandidateProduct) {
    info!(
        target: "orchestrator",
        item = %item.label(),
        chosen = %chosen.title.chars().take(60).collect::<String>(),
        price = ?chosen.price,
        badges = ?chosen.badges,
        "product selected"
    );
}

async fn challenged(session: &dyn CartSession, job_id: &JobId, reason: String) -> BuildOutcome {
    warn!(target: "orchestrator", %job_id, %reason, "challenge raised; aborting build");
    let evidence = session.capture_evidence(job_id.as_str()).await;
    BuildOutcome::Challenge { reason, evidence }
}

async fn failed(session: &dyn CartSession, job_id: &JobId, reason: String) -> BuildOutcome {
    warn!(target: "orchestrator", %job_id, %reason, "build failed");
    let evidence = session.capture_evidence(job_id.as_str()).await;
    BuildOutcome::Failure { reason, evidence }
}
