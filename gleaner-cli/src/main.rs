//! gleaner -- collect logs from many hosts, pods and files at once.

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use gleaner_cli::cli::{Cli, Commands, OutputFormat};
use gleaner_cli::commands::{self, CommandContext};
use gleaner_cli::error::CliError;
use gleaner_cli::logging::init_tracing;
use gleaner_cli::metrics_server::install_metrics_recorder;
use gleaner_cli::output::OutputWriter;
use gleaner_core::config::{GeneralConfig, GleanerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = GleanerConfig::load(&cli.config).await;
    let general = match &loaded {
        Ok(config) => config.general.clone(),
        Err(_) => GeneralConfig::default(),
    };
    if let Err(e) = init_tracing(&general, cli.log_level.as_deref()) {
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }

    let config = match loaded {
        Ok(config) => config,
        Err(e) => return exit(CliError::from(e)),
    };

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = install_metrics_recorder(addr) {
            return exit(CliError::Config(e.to_string()));
        }
    }

    if cli.no_color || cli.output == OutputFormat::Json || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            on_signal.cancel();
        }
    });

    tracing::debug!(config = %cli.config.display(), "gleaner starting");

    let ctx = CommandContext {
        config,
        writer: OutputWriter::new(cli.output),
        cancel,
    };

    let result = match cli.command {
        Commands::Fetch(args) => commands::collect::fetch(&ctx, args).await,
        Commands::Stream(args) => commands::collect::stream(&ctx, args).await,
        Commands::LsLogs(args) => commands::collect::ls_logs(&ctx, args).await,
        Commands::Cp(args) => commands::collect::cp(&ctx, args).await,
        Commands::Configtest(args) => commands::configtest::execute(&ctx, args).await,
        Commands::Targets(args) => commands::targets::execute(&ctx, args).await,
        Commands::Tags => commands::tags::execute(&ctx).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => exit(e),
    }
}

fn exit(err: CliError) -> ExitCode {
    eprintln!("error: {err}");
    let code = err.exit_code();
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
