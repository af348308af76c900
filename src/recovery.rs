//! Out-of-band session refresh used before escalating a challenged job.

use std::sync::Arc;

use async_trait::async_trait;
use session_engine::{silent_refresh, EngineConfig};
use stealth::StealthControl;
use tracing::info;

/// Tries to earn a fresh, accepted session state without a human.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    /// `true` when the stored session state was refreshed and saved.
    async fn refresh(&self) -> bool;
}

/// Runs the warm-up in a visible browser so the site's client-side checks
/// can pass, then saves the resulting state.
pub struct VisibleRefresher {
    config: EngineConfig,
    stealth: Arc<dyn StealthControl>,
}

impl VisibleRefresher {
    pub fn new(config: EngineConfig, stealth: Arc<dyn StealthControl>) -> Self {
        Self { config, stealth }
    }
}

#[async_trait]
impl SessionRefresher for VisibleRefresher {
    async fn refresh(&self) -> bool {
        info!(
            target: "lifecycle",
            state = %self.config.session_state.display(),
            "starting silent session refresh"
        );
        silent_refresh(&self.config, self.stealth.as_ref()).await
    }
}

/// Never refreshes. For deployments without a display.
pub struct NoRefresh;

#[async_trait]
impl SessionRefresher for NoRefresh {
    async fn refresh(&self) -> bool {
        false
    }
}
