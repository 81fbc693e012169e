//! Command handlers -- one module per subcommand

pub mod collect;
pub mod configtest;
pub mod tags;
pub mod targets;

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use gleaner_collector::SessionConfig;
use gleaner_core::config::GleanerConfig;
use gleaner_core::target::{TargetFilter, filter_targets};
use gleaner_core::types::{Target, Window};

use crate::cli::{FilterArgs, WindowArgs};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Format accepted by `--start-time` / `--end-time`.
pub const TIME_ARG_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default look-back (hours) when `--start-time` is omitted.
pub const DEFAULT_LOOKBACK_HOURS: i64 = 1;

/// Shared state handed to every command.
pub struct CommandContext {
    /// Loaded configuration (file + env overrides)
    pub config: GleanerConfig,
    /// Report / record output settings
    pub writer: OutputWriter,
    /// Cancelled on Ctrl-C
    pub cancel: CancellationToken,
}

/// Resolve configured targets and apply the command line filters.
///
/// An empty selection is an error: there is nothing to do.
pub fn select_targets(config: &GleanerConfig, args: &FilterArgs) -> Result<Vec<Target>, CliError> {
    let all = config.targets()?;
    let filter = TargetFilter {
        tags: args.tag.clone(),
        ignore_tags: args.ignore_tag.clone(),
        source: args.source.clone(),
    };
    let selected = filter_targets(&all, &filter)?;
    if selected.is_empty() {
        return Err(CliError::Command("no targets match the given filters".to_owned()));
    }
    Ok(selected)
}

/// Session settings from `[collector]`, with the `--concurrency` override.
pub fn session_config(config: &GleanerConfig, concurrency: Option<usize>) -> SessionConfig {
    let mut session = SessionConfig::from_core(&config.collector);
    if let Some(concurrency) = concurrency {
        session.concurrency = concurrency;
    }
    session
}

/// Parse a local wall-clock time into UTC.
///
/// Ambiguous local times (DST fold) take the earlier instant.
pub fn parse_local_time(value: &str) -> Result<DateTime<Utc>, CliError> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), TIME_ARG_FORMAT).map_err(|e| {
        CliError::Command(format!(
            "invalid time '{value}' (expected YYYY-MM-DD HH:MM:SS): {e}"
        ))
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| CliError::Command(format!("local time '{value}' does not exist")))
}

/// Build the collection window from `--start-time` / `--end-time`.
///
/// Start defaults to one hour before `now`; end defaults to open.
pub fn parse_window(args: &WindowArgs, now: DateTime<Utc>) -> Result<Window, CliError> {
    let start = match args.start_time.as_deref() {
        Some(value) => parse_local_time(value)?,
        None => now - Duration::hours(DEFAULT_LOOKBACK_HOURS),
    };
    let end = args.end_time.as_deref().map(parse_local_time).transpose()?;
    if let Some(end) = end {
        if end <= start {
            return Err(CliError::Command(format!(
                "end time {} must be after start time {}",
                end.with_timezone(&Local).format(TIME_ARG_FORMAT),
                start.with_timezone(&Local).format(TIME_ARG_FORMAT)
            )));
        }
    }
    Ok(Window::new(Some(start), end))
}
