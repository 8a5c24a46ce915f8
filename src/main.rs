//! Binary entry point for the bootprobe CLI.

use std::io::{self, Write};
use std::net::IpAddr;
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use bootprobe::{
    CheckOutcome, HarnessConfig, InstanceNetworking, ProbeError, ProcessCommandRunner,
    SshConfig, SshInstance, Suite, SuiteContext, SuiteReport, ReleaseInfo, TargetInstance,
    UserDataError, resolve_user_data, run_checks, sample_users_groups, users_groups,
};

mod cli;

use cli::{Cli, PlanCommand, RenderCommand, VerifyCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown suite `{0}` (available: users-groups)")]
    UnknownSuite(String),
    #[error("instance error: {0}")]
    Instance(String),
    #[error("release detection failed: {0}")]
    Release(String),
    #[error(transparent)]
    Payload(#[from] UserDataError),
    #[error("failed to encode report: {0}")]
    Encode(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = dispatch(cli).await.unwrap_or_else(|err| {
        report_error(&err);
        1
    });

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Verify(command) => verify_command(command).await,
        Cli::Render(command) => render_command(&command),
        Cli::Plan(command) => plan_command(&command),
    }
}

async fn verify_command(args: VerifyCommand) -> Result<i32, CliError> {
    let suite = build_suite(&args.suite)?;

    let public_ip: IpAddr = args
        .host
        .parse()
        .map_err(|_| CliError::Config(format!("invalid host address: {}", args.host)))?;
    let networking = InstanceNetworking {
        public_ip,
        ssh_port: args.port,
    };

    let ssh_config =
        SshConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let instance = SshInstance::with_process_runner(ssh_config, networking)
        .map_err(|err| CliError::Instance(err.to_string()))?;

    // First boot provisioning must have finished before anything is probed.
    instance
        .wait_for_boot()
        .await
        .map_err(|err| CliError::Instance(err.to_string()))?;
    let os_release = instance
        .read_from_file("/etc/os-release")
        .map_err(|err| CliError::Instance(err.to_string()))?;
    let release =
        ReleaseInfo::from_os_release(&os_release).map_err(|err| CliError::Release(err.to_string()))?;

    let cx = SuiteContext { instance, release };
    let report = run_checks(&suite, &cx)
        .await
        .map_err(|err| CliError::Instance(err.to_string()))?;

    if args.json {
        let encoded =
            serde_json::to_string_pretty(&report).map_err(|err| CliError::Encode(err.to_string()))?;
        writeln!(io::stdout(), "{encoded}").ok();
    } else {
        write_report(io::stdout(), &report);
    }
    Ok(if report.is_success() { 0 } else { 1 })
}

fn render_command(args: &RenderCommand) -> Result<i32, CliError> {
    let payload = suite_payload(&args.suite)?;
    write!(io::stdout(), "{payload}").ok();
    Ok(0)
}

fn plan_command(args: &PlanCommand) -> Result<i32, CliError> {
    let payload = match resolve_user_data(args.user_data.as_deref(), args.user_data_file.as_deref())?
    {
        Some(payload) => payload,
        None => suite_payload(&args.suite)?,
    };

    let config =
        HarnessConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let mut request = config
        .as_request()
        .map_err(|err| CliError::Config(err.to_string()))?;
    request.user_data = Some(payload);

    let mut stdout = io::stdout();
    writeln!(stdout, "image_label={}", request.image_label).ok();
    writeln!(stdout, "instance_type={}", request.instance_type).ok();
    writeln!(stdout, "zone={}", request.zone).ok();
    writeln!(
        stdout,
        "user_data_size={}",
        request.user_data.as_deref().map_or(0, str::len)
    )
    .ok();
    Ok(0)
}

fn build_suite(name: &str) -> Result<Suite<SshInstance<ProcessCommandRunner>>, CliError> {
    match name {
        "users-groups" => Ok(users_groups::suite()?),
        other => Err(CliError::UnknownSuite(other.to_owned())),
    }
}

fn suite_payload(name: &str) -> Result<String, CliError> {
    match name {
        "users-groups" => Ok(sample_users_groups().render()?),
        other => Err(CliError::UnknownSuite(other.to_owned())),
    }
}

fn write_report(mut target: impl Write, report: &SuiteReport) {
    for check in &report.checks {
        match &check.outcome {
            CheckOutcome::Passed => {
                writeln!(target, "PASS {}", check.name).ok();
            }
            CheckOutcome::Failed { reason } => {
                writeln!(target, "FAIL {}: {reason}", check.name).ok();
            }
            CheckOutcome::Skipped { reason } => {
                writeln!(target, "SKIP {}: {reason}", check.name).ok();
            }
        }
    }
    writeln!(
        target,
        "{}: {} passed, {} failed, {} skipped",
        report.suite,
        report.passed(),
        report.failed(),
        report.skipped()
    )
    .ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
