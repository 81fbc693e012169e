//! `gleaner configtest` command handler
//!
//! Reads one line from every selected target, one target at a time, and
//! reports whether its timestamp could be parsed with the configured format.

use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use gleaner_collector::{Collector, Operation};
use gleaner_core::types::{Record, RecordType, Target};

use crate::cli::FilterArgs;
use crate::commands::{CommandContext, select_targets, session_config};
use crate::error::CliError;
use crate::output::Render;

/// Result of checking one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    /// A timestamp was extracted.
    Ok,
    /// `type = none`: nothing to parse.
    Skip,
    /// A line was read but no timestamp came out of it.
    ParseError { line: String },
    /// The target produced no line at all.
    ReadError,
    /// The collector failed.
    Failed { error: String },
}

impl CheckStatus {
    /// Whether this result counts as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ParseError { .. } | Self::ReadError | Self::Failed { .. }
        )
    }

    /// Classify the outcome of a sample run.
    pub fn classify(record_type: RecordType, sampled: Option<&Record>) -> Self {
        match sampled {
            Some(record) if record.timestamp.is_some() => Self::Ok,
            Some(_) if record_type == RecordType::None => Self::Skip,
            Some(record) => Self::ParseError {
                line: record.content.clone(),
            },
            None => Self::ReadError,
        }
    }
}

/// One target's check.
#[derive(Debug, Clone, Serialize)]
pub struct TargetCheck {
    pub source: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub regexp: Option<String>,
    pub time_format: Option<String>,
    pub multi_line: bool,
    #[serde(flatten)]
    pub status: CheckStatus,
}

/// Full configtest report.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigtestReport {
    pub checks: Vec<TargetCheck>,
    pub failures: usize,
}

impl ConfigtestReport {
    pub fn new(checks: Vec<TargetCheck>) -> Self {
        let failures = checks.iter().filter(|c| c.status.is_failure()).count();
        Self { checks, failures }
    }
}

impl Render for ConfigtestReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for check in &self.checks {
            write!(w, "{}: ", check.source)?;
            match &check.status {
                CheckStatus::Ok => writeln!(w, "{}", "OK".green().bold())?,
                CheckStatus::Skip => {
                    writeln!(w, "{}", "Skip (because type=none)".yellow().bold())?
                }
                CheckStatus::ReadError => writeln!(w, "{}", "Log read error".red().bold())?,
                CheckStatus::Failed { error } => {
                    writeln!(w, "{}", "Collect error".red().bold())?;
                    writeln!(w, "    {} {}", "     Error:".red(), error.red())?;
                }
                CheckStatus::ParseError { line } => {
                    writeln!(w, "{}", "Timestamp parse error".red().bold())?;
                    let regexp = check.regexp.as_deref().unwrap_or("-");
                    let time_format = check.time_format.as_deref().unwrap_or("-");
                    writeln!(w, "    {} {}", "      Type:".red(), check.record_type.to_string().red())?;
                    writeln!(w, "    {} {}", "    Regexp:".red(), regexp.red())?;
                    writeln!(w, "    {} {}", "TimeFormat:".red(), time_format.red())?;
                    writeln!(w, "    {} {}", " MultiLine:".red(), check.multi_line.to_string().red())?;
                    writeln!(w, "    {} {}", "       Log:".red(), line.red())?;
                }
            }
        }

        writeln!(w)?;
        let summary = format!("{} targets, {} failure", self.checks.len(), self.failures);
        if self.failures > 0 {
            writeln!(w, "{}", summary.red().bold())?;
        } else {
            writeln!(w, "{}", summary.green().bold())?;
        }
        Ok(())
    }
}

/// Execute the `configtest` command.
pub async fn execute(ctx: &CommandContext, args: FilterArgs) -> Result<(), CliError> {
    let targets = select_targets(&ctx.config, &args)?;
    let session = session_config(&ctx.config, Some(1));
    info!(targets = targets.len(), "testing timestamp parsing");

    let mut checks = Vec::with_capacity(targets.len());
    for target in &targets {
        if ctx.cancel.is_cancelled() {
            return Err(CliError::Interrupted);
        }
        let status = match Collector::from_target(target, &session, ctx.cancel.child_token()) {
            Ok(collector) => {
                let (tx, rx) = mpsc::channel(session.channel_capacity.max(1));
                let run = async move { collector.run(&tx, &Operation::Sample).await };
                let (result, sampled) = tokio::join!(run, first_record(rx));
                match result {
                    Ok(()) => CheckStatus::classify(target.record_type, sampled.as_ref()),
                    Err(e) => CheckStatus::Failed {
                        error: e.to_string(),
                    },
                }
            }
            Err(e) => CheckStatus::Failed {
                error: e.to_string(),
            },
        };
        checks.push(check(target, status));
    }

    let report = ConfigtestReport::new(checks);
    ctx.writer.render(&report)?;

    if report.failures > 0 {
        return Err(CliError::TargetsFailed {
            failed: report.failures,
            total: report.checks.len(),
        });
    }
    Ok(())
}

async fn first_record(mut rx: mpsc::Receiver<Record>) -> Option<Record> {
    let first = rx.recv().await;
    while rx.recv().await.is_some() {}
    first
}

fn check(target: &Target, status: CheckStatus) -> TargetCheck {
    TargetCheck {
        source: target.source.clone(),
        record_type: target.record_type,
        regexp: target.regexp.clone(),
        time_format: target.time_format.clone(),
        multi_line: target.multi_line,
        status,
    }
}
