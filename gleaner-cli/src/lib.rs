//! gleaner CLI library -- argument parsing, command handlers and output.
//!
//! The `gleaner` binary is a thin wrapper around [`commands`]; integration
//! tests drive the same handlers.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod metrics_server;
pub mod output;
