//! Headful sessions: account linking, human resume and silent refresh.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{Cdp, CdpAdapter, SessionState};
use serde_json::Value;
use stealth::StealthControl;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::probes::{first_match, SelectorTable};
use crate::session::{prepare_page, BrowserPage, EngineConfig};
use crate::site::SiteConfig;

/// URL fragments that mean the visible browser is not logged in yet.
const SIGNED_OUT_MARKERS: [&str; 4] = ["signin", "login", "blocked", "captcha"];

const AUTH_SIGNALS_SCRIPT: &str = r#"(() => {
  const html = document.documentElement ? document.documentElement.outerHTML : '';
  const signals = ['sign-out', 'Sign out', 'Sign Out', '"isLoggedIn":true',
    '"isSignedIn":true', 'account-menu', 'My Account'];
  return signals.some((s) => html.includes(s));
})()"#;

const REFRESH_HOME_SETTLE: Duration = Duration::from_secs(7);
const REFRESH_LOCALE_SETTLE: Duration = Duration::from_secs(4);

/// Which stored state a visible browser starts from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibleStart {
    /// Clean profile, for logging in from scratch.
    Fresh,
    /// Stored session state with tracking cookies removed.
    Stored,
}

pub struct VisibleSession {
    page: Arc<dyn BrowserPage>,
    site: SiteConfig,
    selectors: Arc<SelectorTable>,
    session_state: PathBuf,
    nav_timeout: Duration,
}

impl VisibleSession {
    /// Launches a headful browser regardless of the configured mode.
    pub async fn launch(
        config: &EngineConfig,
        stealth: &dyn StealthControl,
        start: VisibleStart,
    ) -> Result<Self, SessionError> {
        let adapter = Arc::new(CdpAdapter::launch(config.cdp.headful()).await?);
        let origin = config.site.origin();
        let prepared = match start {
            VisibleStart::Stored => {
                prepare_page(
                    adapter.as_ref(),
                    stealth,
                    &origin,
                    &config.session_state,
                    true,
                )
                .await
            }
            VisibleStart::Fresh => stealth
                .configure_page(adapter.as_ref(), &origin)
                .await
                .map(|_| ())
                .map_err(SessionError::from),
        };
        if let Err(err) = prepared {
            adapter.shutdown().await;
            return Err(err);
        }
        info!(target: "session", ?start, "visible browser opened");
        Ok(Self::attach(adapter, config))
    }

    pub fn attach(page: Arc<dyn BrowserPage>, config: &EngineConfig) -> Self {
        Self {
            page,
            site: config.site.clone(),
            selectors: config.selectors.clone(),
            session_state: config.session_state.clone(),
            nav_timeout: config.nav_timeout(),
        }
    }

    fn cdp(&self) -> &dyn Cdp {
        self.page.cdp()
    }

    pub async fn open_home(&self) -> Result<(), SessionError> {
        self.cdp()
            .navigate(&self.site.home_url(), self.nav_timeout)
            .await?;
        Ok(())
    }

    /// Home first so the site sets its first-party cookies, then sign-in.
    pub async fn open_signin(&self) -> Result<(), SessionError> {
        self.open_home().await?;
        sleep(Duration::from_secs(2)).await;
        self.cdp()
            .navigate(&self.site.signin_url(), self.nav_timeout)
            .await?;
        sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    /// True only on positive evidence of an account session; the URL alone
    /// never counts.
    pub async fn is_logged_in(&self) -> bool {
        let url = match self.cdp().current_url().await {
            Ok(url) => url.to_ascii_lowercase(),
            Err(err) => {
                debug!(target: "session", error = %err, "could not read url");
                return false;
            }
        };
        if SIGNED_OUT_MARKERS.iter().any(|m| url.contains(m)) {
            return false;
        }
        sleep(Duration::from_millis(1500)).await;
        if first_match(self.cdp(), &self.selectors.logged_in)
            .await
            .is_some()
        {
            return true;
        }
        matches!(
            self.cdp().evaluate(AUTH_SIGNALS_SCRIPT).await,
            Ok(Value::Bool(true))
        )
    }

    /// Some auth cookies are only issued once the account page loads.
    pub async fn visit_account(&self) {
        match self
            .cdp()
            .navigate(&self.site.account_url(), Duration::from_secs(20))
            .await
        {
            Ok(()) => sleep(Duration::from_secs(2)).await,
            Err(err) => {
                warn!(target: "session", error = %err, "could not open account page before save")
            }
        }
    }

    pub async fn save_state(&self) -> Result<PathBuf, SessionError> {
        let state = SessionState::capture(self.cdp()).await?;
        state.save(&self.session_state).await?;
        info!(
            target: "session",
            path = %self.session_state.display(),
            cookies = state.cookies.len(),
            "session state saved"
        );
        Ok(self.session_state.clone())
    }

    /// Finishes the link flow. Returns `false` without saving when the
    /// browser does not show a logged-in account.
    pub async fn finish_link(&self) -> Result<bool, SessionError> {
        if !self.is_logged_in().await {
            return Ok(false);
        }
        self.visit_account().await;
        self.save_state().await?;
        Ok(true)
    }

    /// Lets the site's client-side checks pass in a real window, then keeps
    /// the refreshed state. Returns whether the site is reachable.
    pub async fn refresh(&self) -> Result<bool, SessionError> {
        self.cdp()
            .navigate(&self.site.home_url(), self.nav_timeout)
            .await?;
        sleep(REFRESH_HOME_SETTLE).await;
        self.cdp()
            .navigate(&self.site.locale_url(), Duration::from_secs(20))
            .await?;
        sleep(REFRESH_LOCALE_SETTLE).await;

        let url = self.cdp().current_url().await?;
        let title = self.cdp().title().await.unwrap_or_default();
        let body = self
            .cdp()
            .body_text(stealth::block_detect::CONTENT_SNIPPET_CHARS)
            .await
            .unwrap_or_default();
        if let Some(reason) = stealth::detect_challenge(&title, &url, &body) {
            warn!(target: "session", %url, %reason, "silent refresh still blocked");
            return Ok(false);
        }
        self.save_state().await?;
        Ok(true)
    }

    pub async fn close(&self) {
        self.page.release().await;
    }
}

/// Runs one silent refresh in its own visible browser. Every failure,
/// including a failed launch, reads as `false`.
pub async fn silent_refresh(config: &EngineConfig, stealth: &dyn StealthControl) -> bool {
    let session = match VisibleSession::launch(config, stealth, VisibleStart::Stored).await {
        Ok(session) => session,
        Err(err) => {
            warn!(target: "session", error = %err, "silent refresh could not start");
            return false;
        }
    };
    let refreshed = match session.refresh().await {
        Ok(ok) => ok,
        Err(err) => {
            warn!(target: "session", error = %err, "silent refresh failed");
            false
        }
    };
    session.close().await;
    if refreshed {
        info!(target: "session", "silent refresh succeeded");
    }
    refreshed
}
