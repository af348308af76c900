use anyhow::{bail, Context, Result};
use cartwright_core_types::{ChatId, Job, JobId, JobReport, JobStatus};
use session_engine::{VisibleSession, VisibleStart};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::commands::{ChatArgs, JobArgs};
use super::context::CliContext;

pub async fn cmd_run_job(args: ChatArgs, ctx: &CliContext) -> Result<()> {
    let services = ctx.services().await?;
    let job = services.desk.create_job(&ChatId::new(args.chat_id)).await?;
    println!("Job {} queued; building cart...", job.job_id);
    let report = services.scheduler.run_job(&job.job_id).await?;
    ctx.output().emit(&report, describe_report)
}

pub async fn cmd_status(args: JobArgs, ctx: &CliContext) -> Result<()> {
    let services = ctx.services().await?;
    let job = services.desk.job(&JobId::from(args.job_id.as_str())).await?;
    ctx.output().emit(&job, describe_job)
}

/// Human side of the escalation: clear the check in a visible browser,
/// keep its session state, then re-queue the job.
pub async fn cmd_resume(args: JobArgs, ctx: &CliContext) -> Result<()> {
    let services = ctx.services().await?;
    let job_id = JobId::from(args.job_id.as_str());
    let job = services.desk.job(&job_id).await?;
    if job.status != JobStatus::NeedsUser {
        bail!("job {job_id} is {}; only jobs waiting on you can be resumed", job.status);
    }

    let session = VisibleSession::launch(&services.engine, services.stealth.as_ref(), VisibleStart::Stored)
        .await
        .context("could not open a visible browser")?;
    if let Err(err) = session.open_home().await {
        warn!(error = %err, "home page did not load; continue in the window manually");
    }
    println!("Complete any verification in the browser window, then press ENTER here.");
    let waited = wait_for_enter().await;
    let saved = session.save_state().await;
    session.close().await;
    waited?;
    let path = saved.context("could not save the browser session")?;
    println!("Session saved to {}", path.display());

    let job = services.lifecycle.resume(&job_id).await?;
    ctx.output().emit(&job, |job| {
        format!("Job {} re-queued; the scheduler will retry it shortly.", job.job_id)
    })
}

pub(crate) async fn wait_for_enter() -> Result<()> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read from stdin")?;
    Ok(())
}

fn describe_job(job: &Job) -> String {
    let mut out = format!("Job {} ({}) is {}", job.job_id, job.chat_id, job.status);
    if let Some(url) = &job.result_url {
        out.push_str(&format!("\nCart: {url}"));
    }
    if let Some(error) = &job.error {
        out.push_str(&format!("\nError: {error}"));
    }
    if let Some(path) = &job.screenshot_path {
        out.push_str(&format!("\nScreenshot: {path}"));
    }
    out
}

pub(crate) fn describe_report(report: &JobReport) -> String {
    let mut out = format!("Job {} finished: {}", report.job_id, report.status);
    if let Some(url) = &report.result_url {
        out.push_str(&format!("\nCart: {url}"));
    }
    if !report.added.is_empty() {
        out.push_str(&format!("\nAdded: {}", report.added.join(", ")));
    }
    if !report.failed.is_empty() {
        out.push_str(&format!("\nCould not add: {}", report.failed.join(", ")));
    }
    if let Some(error) = &report.error {
        out.push_str(&format!("\n{error}"));
    }
    if let Some(path) = &report.screenshot_path {
        out.push_str(&format!("\nScreenshot: {path}"));
    }
    out
}
