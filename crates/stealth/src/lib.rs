//! Anti-detection layer: consistent browser identity, human pacing and
//! challenge-page recognition for automated sessions.

pub mod block_detect;
pub mod config;
pub mod fingerprint;
pub mod tempo;

use crate::config::{StealthPolicy, StealthProfile, StealthProfileBundle, TempoPlan};
use async_trait::async_trait;
use cdp_adapter::{AdapterError, Cdp};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub use block_detect::{detect_challenge, is_tracking_cookie, TRACKING_COOKIES};
pub use tempo::{ScrollPlan, Tempo};

/// Identifier for one applied profile.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Error)]
pub enum StealthError {
    #[error("cdp I/O failure: {0}")]
    CdpIo(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppliedProfile {
    pub profile_id: ProfileId,
    pub profile_name: String,
    pub tempo: String,
}

#[async_trait]
pub trait StealthControl: Send + Sync {
    /// Applies emulation overrides and the masking script to a fresh page.
    /// Must run before the first navigation.
    async fn configure_page(
        &self,
        cdp: &dyn Cdp,
        origin: &str,
    ) -> Result<AppliedProfile, StealthError>;
    /// Fresh tempo source for a session on `origin`.
    fn tempo(&self, origin: &str) -> Tempo;
    /// Inspects the current page for a block or captcha.
    async fn detect_challenge(&self, cdp: &dyn Cdp) -> Result<Option<String>, StealthError>;
}

pub struct StealthRuntime {
    applied: DashMap<String, AppliedProfile>,
    profiles: Arc<RwLock<HashMap<String, StealthProfile>>>,
    tempos: Arc<RwLock<HashMap<String, TempoPlan>>>,
    policy: Arc<RwLock<Option<StealthPolicy>>>,
}

#[derive(Clone, Debug)]
struct ResolvedPolicyChoice {
    profile: Option<String>,
    tempo: Option<String>,
}

impl Default for StealthRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl StealthRuntime {
    /// Runtime preloaded with the built-in desktop profile and human tempo.
    pub fn new() -> Self {
        let runtime = Self::empty();
        runtime.load_bundle(StealthProfileBundle::default());
        runtime
    }

    fn empty() -> Self {
        Self {
            applied: DashMap::new(),
            profiles: Arc::new(RwLock::new(HashMap::new())),
            tempos: Arc::new(RwLock::new(HashMap::new())),
            policy: Arc::new(RwLock::new(None)),
        }
    }

    pub fn from_bundle(bundle: StealthProfileBundle) -> Self {
        let runtime = Self::empty();
        runtime.load_bundle(bundle);
        runtime
    }

    pub fn load_bundle(&self, bundle: StealthProfileBundle) {
        let StealthProfileBundle {
            profiles: profile_defs,
            tempos: tempo_defs,
            policy,
        } = bundle;

        {
            let mut profiles = self.profiles.write();
            profiles.clear();
            for profile in profile_defs {
                profiles.insert(profile.name.clone(), profile);
            }
        }
        {
            let mut tempos = self.tempos.write();
            tempos.clear();
            for tempo in tempo_defs {
                tempos.insert(tempo.name.clone(), tempo);
            }
        }
        *self.policy.write() = policy;
        self.applied.clear();
    }

    fn resolve_policy(&self, origin: &str) -> ResolvedPolicyChoice {
        let policy_guard = self.policy.read();
        let Some(policy) = policy_guard.as_ref() else {
            return ResolvedPolicyChoice {
                profile: None,
                tempo: None,
            };
        };
        let mut choice = ResolvedPolicyChoice {
            profile: Some(policy.defaults.profile.clone()),
            tempo: Some(policy.defaults.tempo.clone()),
        };
        let mut best_len = 0usize;
        for entry in &policy.sites {
            if pattern_matches(&entry.match_pattern, origin) {
                let len = entry.match_pattern.len();
                if len >= best_len {
                    if let Some(profile) = &entry.profile {
                        choice.profile = Some(profile.clone());
                    }
                    if let Some(tempo) = &entry.tempo {
                        choice.tempo = Some(tempo.clone());
                    }
                    best_len = len;
                }
            }
        }
        choice
    }

    fn choose_profile(&self, origin: &str) -> Result<(AppliedProfile, StealthProfile), StealthError> {
        let choice = self.resolve_policy(origin);
        let profiles = self.profiles.read();
        let profile = choice
            .profile
            .as_ref()
            .and_then(|name| profiles.get(name))
            .or_else(|| {
                let mut names: Vec<&String> = profiles.keys().collect();
                names.sort();
                names.first().and_then(|name| profiles.get(*name))
            })
            .cloned()
            .ok_or_else(|| StealthError::Internal("no stealth profiles loaded".into()))?;

        let applied = AppliedProfile {
            profile_id: ProfileId::new(),
            profile_name: profile.name.clone(),
            tempo: self.tempo_plan_for(&choice).name,
        };
        Ok((applied, profile))
    }

    fn tempo_plan_for(&self, choice: &ResolvedPolicyChoice) -> TempoPlan {
        let tempos = self.tempos.read();
        if let Some(plan) = choice.tempo.as_ref().and_then(|name| tempos.get(name)) {
            return plan.clone();
        }
        let mut names: Vec<&String> = tempos.keys().collect();
        names.sort();
        names
            .first()
            .and_then(|name| tempos.get(*name))
            .cloned()
            .unwrap_or_default()
    }

    pub fn applied_profile_for(&self, origin: &str) -> Option<AppliedProfile> {
        self.applied.get(origin).map(|entry| entry.value().clone())
    }

    async fn inject_profile(
        &self,
        cdp: &dyn Cdp,
        profile: &StealthProfile,
    ) -> Result<(), StealthError> {
        if !profile.user_agent.is_empty() {
            cdp.set_user_agent(
                &profile.user_agent,
                profile.accept_language.as_deref(),
                profile.platform.as_deref(),
                profile.locale.as_deref(),
            )
            .await
            .map_err(map_adapter_error)?;
        }

        if let Some(timezone) = &profile.timezone {
            cdp.set_timezone(timezone).await.map_err(map_adapter_error)?;
        }

        if let Some(viewport) = &profile.viewport {
            cdp.set_device_metrics(
                viewport.width,
                viewport.height,
                viewport.device_scale_factor,
                viewport.mobile,
            )
            .await
            .map_err(map_adapter_error)?;
        }

        if !profile.extra_headers.is_empty() {
            let headers: Vec<(String, String)> = profile
                .extra_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            cdp.set_extra_headers(&headers)
                .await
                .map_err(map_adapter_error)?;
        }

        cdp.add_init_script(&fingerprint::init_script(profile))
            .await
            .map_err(map_adapter_error)?;
        Ok(())
    }
}

#[async_trait]
impl StealthControl for StealthRuntime {
    async fn configure_page(
        &self,
        cdp: &dyn Cdp,
        origin: &str,
    ) -> Result<AppliedProfile, StealthError> {
        let (applied, profile) = self.choose_profile(origin)?;
        self.inject_profile(cdp, &profile).await?;
        info!(
            target: "stealth",
            origin,
            profile = %applied.profile_name,
            tempo = %applied.tempo,
            "stealth profile applied"
        );
        self.applied.insert(origin.to_string(), applied.clone());
        Ok(applied)
    }

    fn tempo(&self, origin: &str) -> Tempo {
        let choice = self.resolve_policy(origin);
        Tempo::new(self.tempo_plan_for(&choice))
    }

    async fn detect_challenge(&self, cdp: &dyn Cdp) -> Result<Option<String>, StealthError> {
        let title = cdp.title().await.map_err(map_adapter_error)?;
        let url = cdp.current_url().await.map_err(map_adapter_error)?;
        let body = cdp
            .body_text(block_detect::CONTENT_SNIPPET_CHARS)
            .await
            .map_err(map_adapter_error)?;
        if let Some(reason) = detect_challenge(&title, &url, &body) {
            return Ok(Some(reason));
        }

        for selector in block_detect::CAPTCHA_FRAME_SELECTORS.iter() {
            let matches = cdp.query(selector).await.map_err(map_adapter_error)?;
            if !matches.is_empty() {
                debug!(target: "stealth", selector, "captcha element present");
                return Ok(Some(format!("captcha element {selector} present")));
            }
        }
        Ok(None)
    }
}

fn pattern_matches(pattern: &str, origin: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(idx) = pattern.find('*') {
        let prefix = &pattern[..idx];
        let suffix = &pattern[idx + 1..];
        return origin.starts_with(prefix) && origin.ends_with(suffix);
    }
    origin == pattern
}

fn map_adapter_error(err: AdapterError) -> StealthError {
    let mut hint = err.hint.clone().unwrap_or_default();
    if hint.is_empty() {
        hint = format!("cdp error {:?}", err.kind);
    }
    StealthError::CdpIo(hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StealthPolicy, StealthSitePolicy, StealthSitePolicyEntry};
    use cdp_adapter::{Anchor, CookieParam, KeyPress, Rect};
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Records calls; serves canned title/url/body/query results.
    #[derive(Default)]
    struct FakePage {
        calls: Mutex<Vec<String>>,
        title: String,
        url: String,
        body: String,
        captcha_selector: Option<String>,
    }

    #[async_trait]
    impl Cdp for FakePage {
        async fn navigate(&self, _url: &str, _deadline: Duration) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn current_url(&self) -> Result<String, AdapterError> {
            Ok(self.url.clone())
        }
        async fn title(&self) -> Result<String, AdapterError> {
            Ok(self.title.clone())
        }
        async fn body_text(&self, limit: usize) -> Result<String, AdapterError> {
            Ok(self.body.chars().take(limit).collect())
        }
        async fn evaluate(&self, _expression: &str) -> Result<Value, AdapterError> {
            Ok(Value::Null)
        }
        async fn query(&self, selector: &str) -> Result<Vec<Anchor>, AdapterError> {
            if self.captcha_selector.as_deref() == Some(selector) {
                return Ok(vec![Anchor::default()]);
            }
            Ok(Vec::new())
        }
        async fn scroll_into_view(&self, _s: &str, _i: usize) -> Result<Option<Rect>, AdapterError> {
            Ok(None)
        }
        async fn focus(&self, _s: &str, _i: usize) -> Result<bool, AdapterError> {
            Ok(false)
        }
        async fn set_value(&self, _s: &str, _i: usize, _v: &str) -> Result<bool, AdapterError> {
            Ok(false)
        }
        async fn mouse_move(&self, _x: f64, _y: f64) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn mouse_click(&self, _x: f64, _y: f64, _h: Duration) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn mouse_wheel(&self, _x: f64, _y: f64, _d: f64) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn insert_text(&self, _text: &str) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn press_key(&self, _key: KeyPress) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn screenshot(&self) -> Result<Vec<u8>, AdapterError> {
            Ok(Vec::new())
        }
        async fn set_cookies(&self, _cookies: &[CookieParam]) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn cookies(&self) -> Result<Vec<CookieParam>, AdapterError> {
            Ok(Vec::new())
        }
        async fn add_init_script(&self, _source: &str) -> Result<(), AdapterError> {
            self.calls.lock().await.push("init_script".into());
            Ok(())
        }
        async fn set_user_agent(
            &self,
            user_agent: &str,
            _accept_language: Option<&str>,
            _platform: Option<&str>,
            _locale: Option<&str>,
        ) -> Result<(), AdapterError> {
            self.calls.lock().await.push(format!("ua:{user_agent}"));
            Ok(())
        }
        async fn set_timezone(&self, timezone: &str) -> Result<(), AdapterError> {
            self.calls.lock().await.push(format!("tz:{timezone}"));
            Ok(())
        }
        async fn set_device_metrics(
            &self,
            width: u32,
            height: u32,
            _scale: f64,
            _mobile: bool,
        ) -> Result<(), AdapterError> {
            self.calls
                .lock()
                .await
                .push(format!("metrics:{width}x{height}"));
            Ok(())
        }
        async fn set_extra_headers(&self, _h: &[(String, String)]) -> Result<(), AdapterError> {
            self.calls.lock().await.push("headers".into());
            Ok(())
        }
    }

    fn named_profile(name: &str, ua: &str) -> StealthProfile {
        StealthProfile {
            name: name.into(),
            user_agent: ua.into(),
            ..StealthProfile::default()
        }
    }

    #[tokio::test]
    async fn configure_page_applies_identity_then_script() {
        let runtime = StealthRuntime::new();
        let page = FakePage::default();
        let applied = runtime
            .configure_page(&page, "https://www.shop.test")
            .await
            .expect("configure");
        assert_eq!(applied.profile_name, "desktop-ca");

        let calls = page.calls.lock().await.clone();
        assert!(calls[0].starts_with("ua:Mozilla/5.0"));
        assert!(calls.contains(&"tz:America/Toronto".to_string()));
        assert!(calls.contains(&"metrics:1280x900".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("init_script"));
        assert!(runtime
            .applied_profile_for("https://www.shop.test")
            .is_some());
    }

    #[tokio::test]
    async fn site_policy_picks_longest_match() {
        let runtime = StealthRuntime::from_bundle(StealthProfileBundle {
            profiles: vec![named_profile("a", "UA-A"), named_profile("b", "UA-B")],
            tempos: vec![TempoPlan::instant()],
            policy: Some(StealthPolicy {
                defaults: StealthSitePolicy {
                    profile: "a".into(),
                    tempo: "instant".into(),
                },
                sites: vec![
                    StealthSitePolicyEntry {
                        match_pattern: "*".into(),
                        profile: Some("a".into()),
                        tempo: None,
                    },
                    StealthSitePolicyEntry {
                        match_pattern: "https://www.shop.*".into(),
                        profile: Some("b".into()),
                        tempo: None,
                    },
                ],
            }),
        });
        let page = FakePage::default();
        let applied = runtime
            .configure_page(&page, "https://www.shop.test")
            .await
            .unwrap();
        assert_eq!(applied.profile_name, "b");
        assert_eq!(applied.tempo, "instant");
        assert_eq!(
            runtime.tempo("https://www.shop.test").action_delay(),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn detects_phrase_before_probing_selectors() {
        let runtime = StealthRuntime::new();
        let page = FakePage {
            title: "Just a moment...".into(),
            url: "https://www.shop.test/".into(),
            ..FakePage::default()
        };
        let reason = runtime.detect_challenge(&page).await.unwrap();
        assert_eq!(reason.as_deref(), Some("page shows 'just a moment'"));
    }

    #[tokio::test]
    async fn detects_captcha_iframe() {
        let runtime = StealthRuntime::new();
        let page = FakePage {
            title: "Shop".into(),
            url: "https://www.shop.test/en".into(),
            captcha_selector: Some(r#"iframe[src*="recaptcha"]"#.into()),
            ..FakePage::default()
        };
        let reason = runtime.detect_challenge(&page).await.unwrap().unwrap();
        assert!(reason.contains("recaptcha"));
    }

    #[tokio::test]
    async fn clean_page_has_no_challenge() {
        let runtime = StealthRuntime::new();
        let page = FakePage {
            title: "Shop".into(),
            url: "https://www.shop.test/en".into(),
            body: "Weekly flyer".into(),
            ..FakePage::default()
        };
        assert!(runtime.detect_challenge(&page).await.unwrap().is_none());
    }

    #[test]
    fn wildcard_patterns() {
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("https://*.test", "https://www.shop.test"));
        assert!(!pattern_matches("https://*.ca", "https://www.shop.test"));
    }
}
