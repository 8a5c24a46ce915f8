//! Command-line interface definitions for the `bootprobe` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `bootprobe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "bootprobe",
    about = "Boot-and-inspect verification for declaratively provisioned instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Run a verification suite against a reachable instance.
    #[command(
        name = "verify",
        about = "Run a verification suite against a reachable instance"
    )]
    Verify(VerifyCommand),
    /// Render a suite's declarative user-data payload.
    #[command(name = "render", about = "Render a suite's user-data payload")]
    Render(RenderCommand),
    /// Show the instance request a backend would receive for a suite.
    #[command(
        name = "plan",
        about = "Show the instance request a backend would receive"
    )]
    Plan(PlanCommand),
}

/// Arguments for the `bootprobe verify` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct VerifyCommand {
    /// Public address of the instance under test.
    ///
    /// The instance is expected to have been provisioned with the suite's
    /// payload already; the harness attaches, waits for the boot-finished
    /// marker, then probes the resulting state.
    #[arg(long, value_name = "ADDR")]
    pub(crate) host: String,
    /// SSH port exposed by the instance.
    #[arg(long, value_name = "PORT", default_value_t = 22)]
    pub(crate) port: u16,
    /// Verification suite to run.
    #[arg(long, value_name = "SUITE", default_value = "users-groups")]
    pub(crate) suite: String,
    /// Emit the report as JSON instead of the line-per-check format.
    #[arg(long)]
    pub(crate) json: bool,
}

/// Arguments for the `bootprobe render` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RenderCommand {
    /// Verification suite whose payload should be rendered.
    #[arg(long, value_name = "SUITE", default_value = "users-groups")]
    pub(crate) suite: String,
}

/// Arguments for the `bootprobe plan` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct PlanCommand {
    /// Verification suite whose payload sizes the request.
    #[arg(long, value_name = "SUITE", default_value = "users-groups")]
    pub(crate) suite: String,
    /// Provide user-data inline instead of the suite's payload.
    #[arg(long, value_name = "USER_DATA", conflicts_with = "user_data_file")]
    pub(crate) user_data: Option<String>,
    /// Provide user-data from a local file instead of the suite's payload.
    #[arg(long, value_name = "PATH", conflicts_with = "user_data")]
    pub(crate) user_data_file: Option<String>,
}
