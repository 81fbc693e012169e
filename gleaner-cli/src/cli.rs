//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// gleaner -- collect logs from many hosts, pods and files at once.
///
/// Use `gleaner <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "gleaner", version, about, long_about = None)]
pub struct Cli {
    /// Path to the gleaner.toml (or .yaml) configuration file.
    #[arg(short, long, global = true, default_value = "gleaner.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Disable colored text output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Expose Prometheus metrics on this address while running.
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON (one object per line for records).
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch records inside a time window from every target.
    Fetch(FetchArgs),

    /// Follow every target and print new records as they arrive.
    Stream(StreamArgs),

    /// List log files touched inside a time window.
    LsLogs(FetchArgs),

    /// Copy log files touched inside a time window to a local directory.
    Cp(CpArgs),

    /// Read one line from every target and check timestamp parsing.
    Configtest(FilterArgs),

    /// List targets resolved from the configuration.
    Targets(FilterArgs),

    /// List tags and how many target sets carry each.
    Tags,
}

// ---- target selection ----

/// Target filters shared by every collecting command.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only targets carrying one of these tags (format: foo,bar).
    #[arg(long)]
    pub tag: Vec<String>,

    /// Skip targets carrying one of these tags (format: foo,bar).
    #[arg(long)]
    pub ignore_tag: Vec<String>,

    /// Only targets whose source URL matches this regexp.
    #[arg(long, alias = "url-regexp")]
    pub source: Option<String>,
}

// ---- time window ----

/// Time window bounds, local time `YYYY-MM-DD HH:MM:SS`.
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Window start (default: 1 hour ago).
    #[arg(long)]
    pub start_time: Option<String>,

    /// Window end (default: open).
    #[arg(long)]
    pub end_time: Option<String>,
}

// ---- fetch / ls-logs ----

/// Windowed collection over the selected targets.
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Maximum number of targets collected at once.
    #[arg(short = 'C', long)]
    pub concurrency: Option<usize>,
}

// ---- stream ----

/// Live collection over the selected targets.
#[derive(Args, Debug, Clone, Default)]
pub struct StreamArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Maximum number of targets followed at once.
    #[arg(short = 'C', long)]
    pub concurrency: Option<usize>,
}

// ---- cp ----

/// Copy log files to a local directory.
#[derive(Args, Debug, Clone, Default)]
pub struct CpArgs {
    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Destination directory (default: gleaner-<timestamp>).
    #[arg(short = 'o', long, alias = "out")]
    pub dst: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_fetch_defaults() {
        let args = Cli::try_parse_from(["gleaner", "fetch"]);
        assert!(args.is_ok(), "should parse 'fetch' subcommand");
        let cli = args.expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("gleaner.toml"));
        assert_eq!(cli.output, OutputFormat::Text);
        match cli.command {
            Commands::Fetch(fetch) => {
                assert!(fetch.window.start_time.is_none());
                assert!(fetch.window.end_time.is_none());
                assert!(fetch.concurrency.is_none());
                assert!(fetch.filter.tag.is_empty());
            }
            _ => panic!("expected Fetch command"),
        }
    }

    #[test]
    fn test_cli_parse_fetch_with_window() {
        let cli = Cli::try_parse_from([
            "gleaner",
            "fetch",
            "--start-time",
            "2020-01-01 10:00:00",
            "--end-time",
            "2020-01-01 11:00:00",
            "-C",
            "4",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Fetch(fetch) => {
                assert_eq!(fetch.window.start_time.as_deref(), Some("2020-01-01 10:00:00"));
                assert_eq!(fetch.window.end_time.as_deref(), Some("2020-01-01 11:00:00"));
                assert_eq!(fetch.concurrency, Some(4));
            }
            _ => panic!("expected Fetch command"),
        }
    }

    #[test]
    fn test_cli_parse_filters_repeatable() {
        let cli = Cli::try_parse_from([
            "gleaner",
            "stream",
            "--tag",
            "web,db",
            "--tag",
            "batch",
            "--ignore-tag",
            "noisy",
            "--source",
            "^ssh://",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Stream(stream) => {
                assert_eq!(stream.filter.tag, ["web,db", "batch"]);
                assert_eq!(stream.filter.ignore_tag, ["noisy"]);
                assert_eq!(stream.filter.source.as_deref(), Some("^ssh://"));
            }
            _ => panic!("expected Stream command"),
        }
    }

    #[test]
    fn test_cli_parse_url_regexp_alias() {
        let cli = Cli::try_parse_from(["gleaner", "targets", "--url-regexp", "k8s"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Targets(filter) => assert_eq!(filter.source.as_deref(), Some("k8s")),
            _ => panic!("expected Targets command"),
        }
    }

    #[test]
    fn test_cli_parse_ls_logs() {
        let cli = Cli::try_parse_from(["gleaner", "ls-logs", "--tag", "app"])
            .expect("parse succeeded");
        assert!(matches!(cli.command, Commands::LsLogs(_)), "expected LsLogs command");
    }

    #[test]
    fn test_cli_parse_cp_with_dst() {
        let cli = Cli::try_parse_from(["gleaner", "cp", "--dst", "/tmp/out", "--start-time", "2020-01-01 00:00:00"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Cp(cp) => {
                assert_eq!(cp.dst, Some(PathBuf::from("/tmp/out")));
                assert!(cp.fetch.window.start_time.is_some());
            }
            _ => panic!("expected Cp command"),
        }
    }

    #[test]
    fn test_cli_parse_cp_out_alias() {
        let cli = Cli::try_parse_from(["gleaner", "cp", "--out", "mirror"]).expect("parse succeeded");
        match cli.command {
            Commands::Cp(cp) => assert_eq!(cp.dst, Some(PathBuf::from("mirror"))),
            _ => panic!("expected Cp command"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gleaner",
            "tags",
            "--output",
            "json",
            "--log-level",
            "debug",
            "-c",
            "/etc/gleaner.yaml",
            "--no-color",
        ])
        .expect("parse succeeded");
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, PathBuf::from("/etc/gleaner.yaml"));
        assert!(cli.no_color);
        assert!(matches!(cli.command, Commands::Tags));
    }

    #[test]
    fn test_cli_parse_metrics_addr() {
        let cli = Cli::try_parse_from(["gleaner", "stream", "--metrics-addr", "127.0.0.1:9100"])
            .expect("parse succeeded");
        assert_eq!(cli.metrics_addr, Some("127.0.0.1:9100".parse().expect("valid addr")));
    }

    #[test]
    fn test_cli_parse_invalid_output_format() {
        let args = Cli::try_parse_from(["gleaner", "tags", "--output", "yaml"]);
        assert!(args.is_err(), "unknown output format should be rejected");
    }

    #[test]
    fn test_cli_parse_invalid_concurrency() {
        let args = Cli::try_parse_from(["gleaner", "fetch", "-C", "many"]);
        assert!(args.is_err(), "non-numeric concurrency should be rejected");
    }

    #[test]
    fn test_cli_parse_missing_subcommand() {
        let args = Cli::try_parse_from(["gleaner"]);
        assert!(args.is_err(), "subcommand is required");
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
