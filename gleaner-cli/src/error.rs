//! CLI-specific error types and exit code mapping

use gleaner_collector::CollectError;
use gleaner_core::error::{ConfigError, GleanerError};

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Some targets failed while the rest completed.
    #[error("{failed} of {total} targets failed")]
    TargetsFailed { failed: usize, total: usize },

    /// The run was stopped by Ctrl-C.
    #[error("interrupted")]
    Interrupted,

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from gleaner-core.
    #[error("{0}")]
    Core(#[from] GleanerError),

    /// Collection error that stopped the whole run.
    #[error("collect error: {0}")]
    Collect(#[from] CollectError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                              |
    /// |------|--------------------------------------|
    /// | 0    | Success                              |
    /// | 1    | General / command error              |
    /// | 2    | Configuration error                  |
    /// | 3    | Some targets failed                  |
    /// | 10   | IO error                             |
    /// | 130  | Interrupted (Ctrl-C)                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(GleanerError::Config(_)) => 2,
            Self::Collect(CollectError::Config { .. }) => 2,
            Self::TargetsFailed { .. } => 3,
            Self::Io(_) => 10,
            Self::Interrupted => 130,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Collect(_) => 1,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Core(GleanerError::Config(e))
    }
}
