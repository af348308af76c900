use anyhow::Result;
use tracing::info;

use super::commands::ServeArgs;
use super::context::CliContext;
use crate::server;

pub async fn cmd_serve(args: ServeArgs, ctx: &CliContext) -> Result<()> {
    let services = ctx.services().await?;
    let bind = args.bind.unwrap_or_else(|| ctx.config().server.bind.clone());
    info!(
        target: "server",
        %bind,
        poll_ms = ctx.config().scheduler.poll_interval_ms,
        "starting control plane"
    );
    server::serve(services.serve_state(), &bind).await
}
