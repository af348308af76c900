//! HTTP control plane.

mod router;
mod state;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

pub use router::build_router;
pub use state::{HealthSnapshot, ServeHealth, ServeState};

/// Starts the scheduler, then serves until ctrl-c.
pub async fn serve(state: ServeState, bind: &str) -> Result<()> {
    state.health.mark_live();
    match state.scheduler.spawn().await {
        Ok(()) => state.health.mark_ready(),
        Err(err) => state.health.mark_unready(err.to_string()),
    }

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(target: "server", addr = %listener.local_addr()?, "control plane listening");

    let scheduler = state.scheduler.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!(target: "server", "shutdown requested");
        })
        .await
        .context("server error")?;
    scheduler.stop();
    Ok(())
}
