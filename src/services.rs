//! Wires the store, the browser side and the scheduler from an [`AppConfig`].

use std::sync::Arc;

use cartwright_job_store::{LocalJobStore, SharedJobStore};
use cartwright_scheduler::{JobRegistry, Scheduler};
use item_parser::ItemInterpreter;
use product_selector::{ProductJudge, ProductSelector};
use session_engine::{BrowserSessionFactory, EngineConfig, SessionFactory};
use stealth::{StealthControl, StealthRuntime};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::{CartError, CartResult};
use crate::ingest::ChatDesk;
use crate::lifecycle::JobLifecycle;
use crate::llm::{AnthropicClient, ClaudeConfig};
use crate::orchestrator::{CartBuilder, RetryPolicy};
use crate::recovery::{NoRefresh, SessionRefresher, VisibleRefresher};
use crate::server::ServeState;

pub struct Services {
    pub store: SharedJobStore,
    pub desk: ChatDesk,
    pub lifecycle: Arc<JobLifecycle>,
    pub scheduler: Arc<Scheduler>,
    pub registry: JobRegistry,
    pub engine: EngineConfig,
    pub stealth: Arc<StealthRuntime>,
}

impl Services {
    /// Real browser sessions, a JSON store under the data dir, and the
    /// Anthropic client when a key is configured.
    pub async fn from_config(config: &AppConfig) -> CartResult<Self> {
        let data_dir = &config.storage.data_dir;
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|source| CartError::Io {
                path: data_dir.clone(),
                source,
            })?;
        let store: SharedJobStore =
            Arc::new(LocalJobStore::open(config.storage.job_store_path()).await?);

        let engine = config.engine_config()?;
        let stealth = Arc::new(config.stealth_runtime()?);
        let control: Arc<dyn StealthControl> = stealth.clone();
        let sessions: Arc<dyn SessionFactory> =
            Arc::new(BrowserSessionFactory::new(engine.clone(), control.clone()));
        let refresher: Arc<dyn SessionRefresher> = if config.retry.silent_refresh {
            Arc::new(VisibleRefresher::new(engine.clone(), control))
        } else {
            Arc::new(NoRefresh)
        };

        Ok(Self::assemble(config, store, sessions, refresher, engine, stealth))
    }

    /// Builds the job pipeline over the given collaborators.
    pub fn assemble(
        config: &AppConfig,
        store: SharedJobStore,
        sessions: Arc<dyn SessionFactory>,
        refresher: Arc<dyn SessionRefresher>,
        engine: EngineConfig,
        stealth: Arc<StealthRuntime>,
    ) -> Self {
        let llm = anthropic_client(config, &engine.site.display_name);
        let interpreter = llm.clone().map(|c| c as Arc<dyn ItemInterpreter>);
        let judge = llm.map(|c| c as Arc<dyn ProductJudge>);

        let builder = CartBuilder::new(ProductSelector::new(judge), RetryPolicy::from(&config.retry));
        let lifecycle = Arc::new(JobLifecycle::new(store.clone(), sessions, refresher, builder));
        let registry = JobRegistry::new();
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            lifecycle.clone(),
            registry.clone(),
            config.scheduler_config(),
        ));
        let desk = ChatDesk::new(store.clone(), interpreter);

        Self {
            store,
            desk,
            lifecycle,
            scheduler,
            registry,
            engine,
            stealth,
        }
    }

    pub fn serve_state(&self) -> ServeState {
        ServeState::new(self.desk.clone(), self.lifecycle.clone(), self.scheduler.clone())
    }
}

fn anthropic_client(config: &AppConfig, site: &str) -> Option<Arc<AnthropicClient>> {
    let Some(claude) = ClaudeConfig::from_settings(&config.llm) else {
        info!(target: "llm", "no API key; using rule-based parsing and selection");
        return None;
    };
    match AnthropicClient::new(claude, site) {
        Ok(client) => {
            info!(target: "llm", model = client.model(), "model-assisted parsing and selection enabled");
            Some(Arc::new(client))
        }
        Err(err) => {
            warn!(target: "llm", error = %err, "model client unavailable");
            None
        }
    }
}
