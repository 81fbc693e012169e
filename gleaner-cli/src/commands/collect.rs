//! `gleaner fetch` / `stream` / `ls-logs` / `cp` command handlers
//!
//! All four share one shape: select targets, fan out through the orchestrator,
//! and let a single writer task drain the merged channel to stdout.

use std::path::PathBuf;

use chrono::{Local, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use gleaner_collector::{Operation, OrchestratorBuilder, RunSummary};
use gleaner_core::types::Target;

use crate::cli::{CpArgs, FetchArgs, StreamArgs};
use crate::commands::{CommandContext, parse_window, select_targets, session_config};
use crate::error::CliError;
use crate::output::write_records;

/// Execute the `fetch` command.
pub async fn fetch(ctx: &CommandContext, args: FetchArgs) -> Result<(), CliError> {
    let window = parse_window(&args.window, Utc::now())?;
    let targets = select_targets(&ctx.config, &args.filter)?;
    run(ctx, &targets, args.concurrency, Operation::Fetch(window)).await
}

/// Execute the `stream` command. Ctrl-C ends it normally.
pub async fn stream(ctx: &CommandContext, args: StreamArgs) -> Result<(), CliError> {
    let targets = select_targets(&ctx.config, &args.filter)?;
    run(ctx, &targets, args.concurrency, Operation::Stream).await
}

/// Execute the `ls-logs` command.
pub async fn ls_logs(ctx: &CommandContext, args: FetchArgs) -> Result<(), CliError> {
    let window = parse_window(&args.window, Utc::now())?;
    let targets = select_targets(&ctx.config, &args.filter)?;
    run(ctx, &targets, args.concurrency, Operation::ListFiles(window)).await
}

/// Execute the `cp` command.
pub async fn cp(ctx: &CommandContext, args: CpArgs) -> Result<(), CliError> {
    let window = parse_window(&args.fetch.window, Utc::now())?;
    let targets = select_targets(&ctx.config, &args.fetch.filter)?;
    let dst_dir = args.dst.unwrap_or_else(default_dst_dir);
    tokio::fs::create_dir_all(&dst_dir).await?;
    info!(dst = %dst_dir.display(), "copying log files");
    run(
        ctx,
        &targets,
        args.fetch.concurrency,
        Operation::Copy { window, dst_dir },
    )
    .await
}

/// `gleaner-<local timestamp>` in the working directory.
pub fn default_dst_dir() -> PathBuf {
    PathBuf::from(format!("gleaner-{}", Local::now().format("%Y%m%dT%H%M%S%z")))
}

async fn run(
    ctx: &CommandContext,
    targets: &[Target],
    concurrency: Option<usize>,
    operation: Operation,
) -> Result<(), CliError> {
    let session = session_config(&ctx.config, concurrency);
    let orchestrator = OrchestratorBuilder::new()
        .config(session)
        .cancel_token(ctx.cancel.clone())
        .build()?;
    let is_stream = matches!(operation, Operation::Stream);

    let (tx, rx) = mpsc::channel(orchestrator.config().channel_capacity.max(1));
    let writer = tokio::spawn(write_records(rx, tokio::io::stdout(), ctx.writer.format()));

    let result = orchestrator.run(targets, operation, tx).await;
    let written = writer
        .await
        .map_err(|e| CliError::Command(format!("output task failed: {e}")))?;

    // A stdout failure is reported over the SinkClosed it causes.
    let written = written?;
    let summary = result?;
    info!(records = written, "output finished");

    if ctx.cancel.is_cancelled() && !is_stream {
        return Err(CliError::Interrupted);
    }
    finish(&summary, targets.len())
}

fn finish(summary: &RunSummary, total: usize) -> Result<(), CliError> {
    for failure in &summary.failed {
        warn!(
            target_id = failure.target_id,
            source = %failure.source,
            error = %failure.error,
            "target did not complete"
        );
    }
    if summary.failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::TargetsFailed {
            failed: summary.failed.len(),
            total,
        })
    }
}
