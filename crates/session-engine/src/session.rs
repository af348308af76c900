use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cartwright_core_types::{CandidateProduct, Item, Outcome};
use cdp_adapter::{AdapterError, Cdp, CdpAdapter, CdpConfig, KeyPress, SessionState};
use parking_lot::Mutex;
use stealth::{StealthControl, Tempo, TRACKING_COOKIES};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::human::Human;
use crate::probes::{first_match, locate, SelectorTable};
use crate::scrape::scrape_results;
use crate::site::SiteConfig;

/// Unwraps a successful step or returns its challenge/failure from the
/// enclosing function.
macro_rules! proceed {
    ($step:expr) => {
        match $step {
            Outcome::Success(value) => value,
            Outcome::Challenge(reason) => return Outcome::Challenge(reason),
            Outcome::Failure(reason) => return Outcome::Failure(reason),
        }
    };
}

const CHALLENGE_SETTLE: Duration = Duration::from_millis(400);
const CART_TIMEOUT: Duration = Duration::from_secs(20);

/// Everything a session needs besides the browser itself.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub cdp: CdpConfig,
    pub site: SiteConfig,
    pub selectors: Arc<SelectorTable>,
    pub session_state: PathBuf,
    pub screenshot_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cdp: CdpConfig::default(),
            site: SiteConfig::default(),
            selectors: Arc::new(SelectorTable::default()),
            session_state: PathBuf::from("./.cartwright/session_state.json"),
            screenshot_dir: PathBuf::from("./.cartwright/screenshots"),
        }
    }
}

impl EngineConfig {
    pub fn nav_timeout(&self) -> Duration {
        Duration::from_millis(self.cdp.default_deadline_ms)
    }
}

/// What to add to the cart.
#[derive(Clone, Debug, PartialEq)]
pub enum ProductRef {
    /// A product detail page.
    Url(String),
    /// The add button on the most recent results page.
    ResultsPage,
    /// Whatever the first product link on the results page leads to.
    FirstResultLink,
}

/// One automated storefront session. Challenge-capable steps return
/// [`Outcome`]; best-effort steps return `Option` and never fail the caller.
#[async_trait]
pub trait CartSession: Send + Sync {
    /// Home page, settle, challenge check, idle scroll.
    async fn warm_up(&self) -> Outcome<()>;
    async fn set_location(&self, postal_code: &str) -> Option<()>;
    async fn search(&self, item: &Item) -> Outcome<Vec<CandidateProduct>>;
    async fn add_to_cart(&self, target: ProductRef) -> Outcome<bool>;
    async fn update_quantity(&self, quantity: u32) -> Option<()>;
    /// Opens the cart and returns its URL.
    async fn open_cart(&self) -> Outcome<String>;
    async fn detect_challenge(&self) -> Outcome<()>;
    async fn capture_evidence(&self, job_id: &str) -> Option<PathBuf>;
    async fn close(&self);
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CartSession>, SessionError>;
}

/// A page the session owns and must release when done.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    fn cdp(&self) -> &dyn Cdp;
    async fn release(&self);
}

#[async_trait]
impl BrowserPage for CdpAdapter {
    fn cdp(&self) -> &dyn Cdp {
        self
    }

    async fn release(&self) {
        self.shutdown().await;
    }
}

/// Applies the stealth profile, then the stored session state. Automated
/// sessions drop bot-manager cookies first so the site sees a fresh device.
pub async fn prepare_page(
    cdp: &dyn Cdp,
    stealth: &dyn StealthControl,
    origin: &str,
    state_path: &Path,
    strip_tracking: bool,
) -> Result<(), SessionError> {
    stealth.configure_page(cdp, origin).await?;
    let Some(mut state) = SessionState::load(state_path).await? else {
        debug!(target: "session", path = %state_path.display(), "no stored session state");
        return Ok(());
    };
    if strip_tracking {
        let removed = state.strip_cookies(TRACKING_COOKIES.as_slice());
        if removed > 0 {
            info!(
                target: "session",
                removed,
                kept = state.cookies.len(),
                "stripped tracking cookies"
            );
        }
    }
    state.apply(cdp).await?;
    Ok(())
}

pub struct BrowserSession {
    page: Arc<dyn BrowserPage>,
    stealth: Arc<dyn StealthControl>,
    tempo: Tempo,
    site: SiteConfig,
    selectors: Arc<SelectorTable>,
    screenshot_dir: PathBuf,
    nav_timeout: Duration,
    last_search: Mutex<Option<String>>,
}

impl BrowserSession {
    pub fn new(
        page: Arc<dyn BrowserPage>,
        stealth: Arc<dyn StealthControl>,
        tempo: Tempo,
        config: &EngineConfig,
    ) -> Self {
        Self {
            page,
            stealth,
            tempo,
            site: config.site.clone(),
            selectors: config.selectors.clone(),
            screenshot_dir: config.screenshot_dir.clone(),
            nav_timeout: config.nav_timeout(),
            last_search: Mutex::new(None),
        }
    }

    fn cdp(&self) -> &dyn Cdp {
        self.page.cdp()
    }

    fn human(&self) -> Human<'_> {
        Human::new(self.cdp(), &self.tempo)
    }

    async fn check(&self) -> Outcome<()> {
        sleep(CHALLENGE_SETTLE).await;
        match self.stealth.detect_challenge(self.cdp()).await {
            Ok(None) => Outcome::Success(()),
            Ok(Some(reason)) => {
                let url = self.cdp().current_url().await.unwrap_or_default();
                warn!(target: "session", %reason, %url, "challenge detected");
                Outcome::Challenge(format!("bot challenge detected ({reason}) at {url}"))
            }
            Err(err) => Outcome::Failure(format!("challenge check failed: {err}")),
        }
    }

    /// Navigates, lets the page settle for a random interval in
    /// `[settle_min, settle_max]` ms, then checks for a challenge.
    async fn visit(&self, url: &str, settle_min: u64, settle_max: u64) -> Outcome<()> {
        if let Err(err) = self.cdp().navigate(url, self.nav_timeout).await {
            return Outcome::Failure(format!("navigation to {url} failed: {err}"));
        }
        self.human().pause_between(settle_min, settle_max).await;
        self.check().await
    }

    async fn idle_scroll(&self) {
        if let Err(err) = self.human().scroll().await {
            debug!(target: "session", error = %err, "scroll skipped");
        }
    }

    async fn dismiss_overlays(&self) {
        for probe in &self.selectors.overlays {
            match locate(self.cdp(), probe).await {
                Ok(Some(anchor)) => {
                    if self.human().click(&probe.selector, &anchor).await.is_ok() {
                        debug!(target: "session", selector = %probe.selector, "overlay dismissed");
                        self.human().pause_between(300, 600).await;
                    }
                }
                Ok(None) => {}
                Err(err) => debug!(target: "session", error = %err, "overlay probe failed"),
            }
        }
    }

    /// Clicks the first add button found on the current page.
    async fn add_here(&self) -> bool {
        for probe in &self.selectors.add_to_cart {
            let anchor = match locate(self.cdp(), probe).await {
                Ok(Some(anchor)) => anchor,
                Ok(None) => continue,
                Err(err) => {
                    debug!(target: "session", selector = %probe.selector, error = %err, "add probe failed");
                    continue;
                }
            };
            match self.human().click(&probe.selector, &anchor).await {
                Ok(()) => {
                    self.human().pause_between(1200, 2500).await;
                    self.dismiss_overlays().await;
                    return true;
                }
                Err(err) => {
                    debug!(target: "session", selector = %probe.selector, error = %err, "add click failed");
                }
            }
        }
        false
    }

    async fn back_to_results(&self) -> Outcome<()> {
        let Some(results) = self.last_search.lock().clone() else {
            return Outcome::Failure("no results page to return to".into());
        };
        let here = self.cdp().current_url().await.unwrap_or_default();
        if here == results {
            return Outcome::Success(());
        }
        self.visit(&results, 800, 1600).await
    }

    async fn open_product(&self, url: &str) -> Outcome<bool> {
        self.human().short_pause().await;
        proceed!(self.visit(url, 1500, 2800).await);
        self.idle_scroll().await;
        Outcome::Success(self.add_here().await)
    }

    async fn write_quantity(&self, quantity: u32) -> Result<bool, AdapterError> {
        self.cdp()
            .navigate(&self.site.cart_url(), CART_TIMEOUT)
            .await?;
        sleep(Duration::from_secs(1)).await;
        let wanted = quantity.to_string();
        for probe in &self.selectors.quantity_input {
            let inputs = self.cdp().query(&probe.selector).await?;
            let Some(last) = inputs.last() else {
                continue;
            };
            if last.text.trim() != wanted {
                self.cdp()
                    .set_value(&probe.selector, last.index, &wanted)
                    .await?;
                self.cdp().focus(&probe.selector, last.index).await?;
                self.cdp().press_key(KeyPress::Enter).await?;
                sleep(Duration::from_secs(1)).await;
            }
            return Ok(true);
        }
        Ok(false)
    }

    async fn enter_postal_code(&self, postal_code: &str) -> Result<bool, AdapterError> {
        let Some((probe, anchor)) = first_match(self.cdp(), &self.selectors.location_button).await
        else {
            warn!(target: "session", "location control not found, skipping postal code");
            return Ok(false);
        };
        self.human().click(&probe.selector, &anchor).await?;
        self.human().pause_between(800, 1500).await;

        let Some((probe, anchor)) = first_match(self.cdp(), &self.selectors.postal_input).await
        else {
            warn!(target: "session", "postal code field not found");
            return Ok(false);
        };
        self.human()
            .type_into(&probe.selector, &anchor, postal_code)
            .await?;
        self.human().short_pause().await;
        self.human().press(KeyPress::Enter).await?;
        self.human().pause_between(1500, 2500).await;
        Ok(true)
    }
}

#[async_trait]
impl CartSession for BrowserSession {
    async fn warm_up(&self) -> Outcome<()> {
        proceed!(self.visit(&self.site.home_url(), 2000, 4000).await);
        self.idle_scroll().await;
        Outcome::Success(())
    }

    async fn set_location(&self, postal_code: &str) -> Option<()> {
        if postal_code.trim().is_empty() {
            return None;
        }
        match self.enter_postal_code(postal_code.trim()).await {
            Ok(true) => {
                info!(target: "session", postal_code, "postal code set");
                Some(())
            }
            Ok(false) => None,
            Err(err) => {
                warn!(target: "session", error = %err, "could not set postal code");
                None
            }
        }
    }

    async fn search(&self, item: &Item) -> Outcome<Vec<CandidateProduct>> {
        let url = self.site.search_url(&item.search_query());
        *self.last_search.lock() = Some(url.clone());
        proceed!(self.visit(&url, 1500, 3000).await);
        self.idle_scroll().await;
        match scrape_results(self.cdp(), &self.site).await {
            Ok(products) => Outcome::Success(products),
            Err(err) => Outcome::Failure(format!("could not read results: {err}")),
        }
    }

    async fn add_to_cart(&self, target: ProductRef) -> Outcome<bool> {
        match target {
            ProductRef::Url(url) => match self.site.absolutize(&url) {
                Some(url) => self.open_product(&url).await,
                None => Outcome::Success(false),
            },
            ProductRef::ResultsPage => {
                proceed!(self.back_to_results().await);
                Outcome::Success(self.add_here().await)
            }
            ProductRef::FirstResultLink => {
                proceed!(self.back_to_results().await);
                let href = first_match(self.cdp(), &self.selectors.product_link)
                    .await
                    .and_then(|(_, anchor)| anchor.href)
                    .and_then(|href| self.site.absolutize(&href));
                match href {
                    Some(url) => self.open_product(&url).await,
                    None => Outcome::Success(false),
                }
            }
        }
    }

    async fn update_quantity(&self, quantity: u32) -> Option<()> {
        match self.write_quantity(quantity).await {
            Ok(true) => Some(()),
            Ok(false) => {
                debug!(target: "session", quantity, "no quantity field in cart");
                None
            }
            Err(err) => {
                debug!(target: "session", quantity, error = %err, "could not update quantity");
                None
            }
        }
    }

    async fn open_cart(&self) -> Outcome<String> {
        if let Err(err) = self
            .cdp()
            .navigate(&self.site.cart_url(), self.nav_timeout)
            .await
        {
            return Outcome::Failure(format!("could not open cart: {err}"));
        }
        sleep(Duration::from_millis(1500)).await;
        proceed!(self.check().await);
        match self.cdp().current_url().await {
            Ok(url) if !url.is_empty() => Outcome::Success(url),
            _ => Outcome::Success(self.site.cart_url()),
        }
    }

    async fn detect_challenge(&self) -> Outcome<()> {
        self.check().await
    }

    async fn capture_evidence(&self, job_id: &str) -> Option<PathBuf> {
        let path = self.screenshot_dir.join(format!("{job_id}.png"));
        let result: Result<(), String> = async {
            tokio::fs::create_dir_all(&self.screenshot_dir)
                .await
                .map_err(|err| err.to_string())?;
            let png = self.cdp().screenshot().await.map_err(|err| err.to_string())?;
            tokio::fs::write(&path, png)
                .await
                .map_err(|err| err.to_string())
        }
        .await;
        match result {
            Ok(()) => {
                info!(target: "session", job_id, path = %path.display(), "screenshot saved");
                Some(path)
            }
            Err(error) => {
                warn!(target: "session", job_id, %error, "screenshot failed");
                None
            }
        }
    }

    async fn close(&self) {
        self.page.release().await;
    }
}

/// Launches Chrome for each automated run.
pub struct BrowserSessionFactory {
    config: EngineConfig,
    stealth: Arc<dyn StealthControl>,
}

impl BrowserSessionFactory {
    pub fn new(config: EngineConfig, stealth: Arc<dyn StealthControl>) -> Self {
        Self { config, stealth }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    async fn open(&self) -> Result<Box<dyn CartSession>, SessionError> {
        let adapter = Arc::new(CdpAdapter::launch(self.config.cdp.clone()).await?);
        let origin = self.config.site.origin();
        if let Err(err) = prepare_page(
            adapter.as_ref(),
            self.stealth.as_ref(),
            &origin,
            &self.config.session_state,
            true,
        )
        .await
        {
            adapter.shutdown().await;
            return Err(err);
        }
        let tempo = self.stealth.tempo(&origin);
        info!(target: "session", headless = self.config.cdp.headless, "automated session opened");
        Ok(Box::new(BrowserSession::new(
            adapter,
            self.stealth.clone(),
            tempo,
            &self.config,
        )))
    }
}
