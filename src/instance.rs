//! SSH-backed inspection client for a provisioned target instance.
//!
//! The harness shells out to the system `ssh` client to run read-only probes,
//! fetch files, reset the provisioner's cached state, and drive reboot
//! cycles. Command execution sits behind a small trait so tests can script
//! outputs without spawning processes.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::Command;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use shell_escape::unix::escape;
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::backend::InstanceNetworking;

/// Default path of the provisioner log scanned for boot warnings.
pub const DEFAULT_BOOT_LOG_PATH: &str = "/var/log/cloud-init.log";

/// Default marker file that appears once first-boot provisioning finishes.
pub const DEFAULT_BOOT_MARKER_PATH: &str = "/var/lib/cloud/instance/boot-finished";

/// Default command that resets the provisioner state ahead of a reboot.
pub const DEFAULT_CLEAN_COMMAND: &str = "sudo cloud-init clean --logs";

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, InstanceError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, InstanceError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| InstanceError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// SSH and boot-cycle settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "BOOTPROBE_SSH")]
pub struct SshConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub ssh_user: String,
    /// Provisioner log inspected for boot warnings.
    #[ortho_config(default = DEFAULT_BOOT_LOG_PATH.to_owned())]
    pub boot_log_path: String,
    /// Marker file whose presence signals a finished boot.
    #[ortho_config(default = DEFAULT_BOOT_MARKER_PATH.to_owned())]
    pub boot_marker_path: String,
    /// Command that clears provisioner state and logs before a reboot.
    #[ortho_config(default = DEFAULT_CLEAN_COMMAND.to_owned())]
    pub clean_command: String,
    /// Seconds between readiness polls during a reboot.
    #[ortho_config(default = 2)]
    pub reboot_poll_interval_secs: u64,
    /// Seconds allowed for the instance to come back after a reboot.
    #[ortho_config(default = 600)]
    pub reboot_timeout_secs: u64,
}

impl SshConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::InvalidConfig`] when the merge fails or the
    /// merged values do not validate.
    pub fn load_without_cli_args() -> Result<Self, InstanceError> {
        let config = Self::load_from_iter([std::ffi::OsString::from("bootprobe")]).map_err(
            |err| InstanceError::InvalidConfig {
                field: err.to_string(),
            },
        )?;
        config.validate()?;
        Ok(config)
    }

    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::InvalidConfig`] when any required field is
    /// empty or a timing value is zero.
    pub fn validate(&self) -> Result<(), InstanceError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        Self::require_value(&self.boot_log_path, "boot_log_path")?;
        Self::require_value(&self.boot_marker_path, "boot_marker_path")?;
        Self::require_value(&self.clean_command, "clean_command")?;
        if self.reboot_poll_interval_secs == 0 {
            return Err(InstanceError::InvalidConfig {
                field: "reboot_poll_interval_secs".to_owned(),
            });
        }
        if self.reboot_timeout_secs == 0 {
            return Err(InstanceError::InvalidConfig {
                field: "reboot_timeout_secs".to_owned(),
            });
        }
        Ok(())
    }

    fn require_value(value: &str, field: &str) -> Result<(), InstanceError> {
        if value.trim().is_empty() {
            return Err(InstanceError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}

/// Errors surfaced while talking to the target instance.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InstanceError {
    /// Raised when configuration is missing required values.
    #[error("invalid instance configuration: missing {field}")]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a remote command that must succeed exits non-zero.
    #[error("remote command `{command}` exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Remote command that was attempted.
        command: String,
        /// Exit status as reported by the remote shell.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when the instance does not answer again after a reboot.
    #[error("instance did not come back within {seconds} seconds after reboot")]
    RebootTimeout {
        /// Configured timeout in seconds.
        seconds: u64,
    },
}

/// Future returned by instance operations that poll the target.
pub type InstanceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, InstanceError>> + 'a>>;

/// Read-and-mutate interface the verification suite drives.
///
/// Implemented by [`SshInstance`] for live targets and by scripted fakes in
/// tests. All probe output is returned raw; callers judge exit codes.
pub trait TargetInstance {
    /// Executes an argv-style command, shell-escaping each argument.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Spawn`] when the transport cannot start.
    fn execute(&self, args: &[&str]) -> Result<CommandOutput, InstanceError>;

    /// Executes a raw shell line on the target (used for state mutations).
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Spawn`] when the transport cannot start.
    fn execute_shell(&self, command: &str) -> Result<CommandOutput, InstanceError>;

    /// Reads a file from the target and returns its contents.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::CommandFailure`] when the file is unreadable.
    fn read_from_file(&self, path: &str) -> Result<String, InstanceError>;

    /// Returns the provisioner boot log contents.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::CommandFailure`] when the log is unreadable.
    fn boot_log(&self) -> Result<String, InstanceError>;

    /// Resets provisioner state and logs so the next boot is observed fresh.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::CommandFailure`] when the reset command fails.
    fn clean(&self) -> Result<(), InstanceError>;

    /// Reboots the target and blocks until it is reachable and booted.
    fn restart(&self) -> InstanceFuture<'_, ()>;
}

/// SSH client bound to one instance's networking details.
#[derive(Debug)]
pub struct SshInstance<R: CommandRunner> {
    config: SshConfig,
    networking: InstanceNetworking,
    runner: R,
}

impl SshInstance<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(
        config: SshConfig,
        networking: InstanceNetworking,
    ) -> Result<Self, InstanceError> {
        Self::new(config, networking, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshInstance<R> {
    /// Creates a new client using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::InvalidConfig`] when configuration validation
    /// fails.
    pub fn new(
        config: SshConfig,
        networking: InstanceNetworking,
        runner: R,
    ) -> Result<Self, InstanceError> {
        config.validate()?;
        Ok(Self {
            config,
            networking,
            runner,
        })
    }

    /// Returns the networking details this client is bound to.
    #[must_use]
    pub const fn networking(&self) -> &InstanceNetworking {
        &self.networking
    }

    fn run_shell(&self, command: &str) -> Result<CommandOutput, InstanceError> {
        let args = self.build_ssh_args(command);
        self.runner.run(&self.config.ssh_bin, &args)
    }

    fn run_required(&self, command: &str) -> Result<CommandOutput, InstanceError> {
        let output = self.run_shell(command)?;
        if output.is_success() {
            return Ok(output);
        }
        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(InstanceError::CommandFailure {
            command: command.to_owned(),
            status: output.code,
            status_text,
            stderr: output.stderr,
        })
    }

    /// Polls the boot-finished marker until it appears or the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::RebootTimeout`] when the marker does not
    /// appear in time.
    pub async fn wait_for_boot(&self) -> Result<(), InstanceError> {
        let marker = escape(self.config.boot_marker_path.as_str().into());
        let command = format!("sudo test -f {marker}");
        self.poll_until_success(&command).await
    }

    async fn poll_until_success(&self, command: &str) -> Result<(), InstanceError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.reboot_timeout_secs);
        let interval = Duration::from_secs(self.config.reboot_poll_interval_secs);

        while Instant::now() <= deadline {
            // Connection refusals while the host reboots surface as non-zero
            // ssh exit codes, not spawn errors, so keep polling on failure.
            if let Ok(output) = self.run_shell(command)
                && output.is_success()
            {
                return Ok(());
            }
            sleep(interval).await;
        }

        Err(InstanceError::RebootTimeout {
            seconds: self.config.reboot_timeout_secs,
        })
    }

    fn build_ssh_args(&self, remote_command: &str) -> Vec<OsString> {
        vec![
            OsString::from("-p"),
            OsString::from(self.networking.ssh_port.to_string()),
            OsString::from("-o"),
            OsString::from("BatchMode=yes"),
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=no"),
            OsString::from("-o"),
            OsString::from("UserKnownHostsFile=/dev/null"),
            OsString::from(format!(
                "{}@{}",
                self.config.ssh_user, self.networking.public_ip
            )),
            OsString::from(remote_command),
        ]
    }
}

impl<R: CommandRunner> TargetInstance for SshInstance<R> {
    fn execute(&self, args: &[&str]) -> Result<CommandOutput, InstanceError> {
        let command = args
            .iter()
            .map(|arg| escape((*arg).into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        self.run_shell(&command)
    }

    fn execute_shell(&self, command: &str) -> Result<CommandOutput, InstanceError> {
        self.run_shell(command)
    }

    fn read_from_file(&self, path: &str) -> Result<String, InstanceError> {
        let escaped = escape(path.into());
        let output = self.run_required(&format!("sudo cat {escaped}"))?;
        Ok(output.stdout)
    }

    fn boot_log(&self) -> Result<String, InstanceError> {
        let path = self.config.boot_log_path.clone();
        self.read_from_file(&path)
    }

    fn clean(&self) -> Result<(), InstanceError> {
        let command = self.config.clean_command.clone();
        self.run_required(&command)?;
        Ok(())
    }

    fn restart(&self) -> InstanceFuture<'_, ()> {
        Box::pin(async move {
            // The connection usually drops mid-command; any exit status is
            // fine as long as the host goes down.
            self.run_shell("sudo shutdown -r now")?;

            // Give the host a moment to actually stop answering before the
            // readiness poll, otherwise the poll can hit the old boot.
            sleep(Duration::from_secs(self.config.reboot_poll_interval_secs)).await;

            self.poll_until_success("true").await?;
            self.wait_for_boot().await
        })
    }
}
