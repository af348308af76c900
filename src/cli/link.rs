use anyhow::{bail, Context, Result};
use session_engine::{VisibleSession, VisibleStart};

use super::context::CliContext;
use super::jobs::wait_for_enter;

/// Interactive login in a clean visible browser; saves the session state
/// only when an account session is detected.
pub async fn cmd_link(ctx: &CliContext) -> Result<()> {
    let engine = ctx.config().engine_config()?;
    let stealth = ctx.config().stealth_runtime()?;

    let session = VisibleSession::launch(&engine, &stealth, VisibleStart::Fresh)
        .await
        .context("could not open a visible browser")?;
    if let Err(err) = session.open_signin().await {
        session.close().await;
        return Err(err).context("could not open the sign-in page");
    }
    println!(
        "Sign in to your {} account in the browser window, then press ENTER here.",
        engine.site.display_name
    );
    let waited = wait_for_enter().await;
    let linked = match waited {
        Ok(()) => session.finish_link().await.map_err(anyhow::Error::from),
        Err(err) => Err(err),
    };
    session.close().await;

    if !linked? {
        bail!("no signed-in account detected; nothing was saved. Run `cartwright link` again.");
    }
    println!("Account linked. Session saved to {}", engine.session_state.display());
    Ok(())
}
