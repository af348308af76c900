use anyhow::Result;

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::items::{cmd_add, cmd_clear, cmd_list, cmd_set_location};
use super::jobs::{cmd_resume, cmd_run_job, cmd_status};
use super::link::cmd_link;
use super::serve::cmd_serve;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, ctx).await,
        Commands::RunJob(args) => cmd_run_job(args, ctx).await,
        Commands::Add(args) => cmd_add(args, ctx).await,
        Commands::List(args) => cmd_list(args, ctx).await,
        Commands::Clear(args) => cmd_clear(args, ctx).await,
        Commands::SetLocation(args) => cmd_set_location(args, ctx).await,
        Commands::Link => cmd_link(ctx).await,
        Commands::Resume(args) => cmd_resume(args, ctx).await,
        Commands::Status(args) => cmd_status(args, ctx).await,
    }
}
