//! Application settings: one YAML document, every field defaulted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cartwright_scheduler::SchedulerConfig;
use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};
use session_engine::{EngineConfig, SelectorTable, SiteConfig};
use stealth::StealthRuntime;
use tracing::info;

use crate::errors::CartError;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: CdpConfig,
    pub site: SiteConfig,
    /// Replacement probe table, YAML.
    pub selectors: Option<PathBuf>,
    /// Stealth profile and tempo bundle, YAML or JSON.
    pub stealth: Option<PathBuf>,
    pub storage: StorageConfig,
    pub scheduler: SchedulerSettings,
    pub retry: RetrySettings,
    pub llm: LlmSettings,
    pub server: ServerSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub session_state: Option<PathBuf>,
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".cartwright"),
            session_state: None,
            screenshot_dir: None,
        }
    }
}

impl StorageConfig {
    pub fn session_state_path(&self) -> PathBuf {
        self.session_state
            .clone()
            .unwrap_or_else(|| self.data_dir.join("session_state.json"))
    }

    pub fn screenshot_dir_path(&self) -> PathBuf {
        self.screenshot_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("screenshots"))
    }

    pub fn job_store_path(&self) -> PathBuf {
        self.data_dir.join("jobs.json")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_ms: u64,
    /// Jobs running at once; 0 lifts the limit.
    pub max_concurrent: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            max_concurrent: 4,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    /// Try a visible-browser refresh before asking the user to step in.
    pub silent_refresh: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_min_ms: 2_000,
            backoff_max_ms: 4_000,
            silent_refresh: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub timeout_ms: u64,
    pub item_max_tokens: u32,
    pub judge_max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-haiku-4-5-20251001".into(),
            api_base: "https://api.anthropic.com/v1".into(),
            timeout_ms: 20_000,
            item_max_tokens: 512,
            judge_max_tokens: 8,
        }
    }
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl LlmSettings {
    /// Key with surrounding whitespace removed; blank keys count as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, CartError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|err| CartError::Config(err.to_string()))
    }

    /// Applies `CARTWRIGHT_*` and `ANTHROPIC_API_KEY` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(flag) = read("CARTWRIGHT_HEADLESS") {
            self.browser.headless = !matches!(flag.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(chrome) = read("CARTWRIGHT_CHROME") {
            self.browser.executable = PathBuf::from(chrome);
        }
        if let Some(dir) = read("CARTWRIGHT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = read("CARTWRIGHT_SESSION_STATE") {
            self.storage.session_state = Some(PathBuf::from(path));
        }
        if let Some(dir) = read("CARTWRIGHT_SCREENSHOT_DIR") {
            self.storage.screenshot_dir = Some(PathBuf::from(dir));
        }
        if let Some(key) = read("ANTHROPIC_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = read("CARTWRIGHT_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(ms) = read("CARTWRIGHT_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.scheduler.poll_interval_ms = ms;
        }
        if let Some(bind) = read("CARTWRIGHT_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn engine_config(&self) -> Result<EngineConfig, CartError> {
        let selectors = match &self.selectors {
            Some(path) => {
                info!(path = %path.display(), "loading selector table");
                SelectorTable::from_path(path)?
            }
            None => SelectorTable::default(),
        };
        Ok(EngineConfig {
            cdp: self.browser.clone(),
            site: self.site.clone(),
            selectors: Arc::new(selectors),
            session_state: self.storage.session_state_path(),
            screenshot_dir: self.storage.screenshot_dir_path(),
        })
    }

    pub fn stealth_runtime(&self) -> Result<StealthRuntime, CartError> {
        match &self.stealth {
            Some(path) => {
                let bundle = stealth::config::load_bundle_from_path(path)?;
                info!(path = %path.display(), profiles = bundle.profiles.len(), "stealth bundle loaded");
                Ok(StealthRuntime::from_bundle(bundle))
            }
            None => Ok(StealthRuntime::new()),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_millis(self.scheduler.poll_interval_ms.max(1)),
            max_concurrent: self.scheduler.max_concurrent,
        }
    }
}
