//! Probe execution and boot-log verification primitives.
//!
//! A check either passes, fails with an expected-versus-actual description,
//! or is skipped because its precondition is unmet. Failures are terminal
//! for the check but never retried and never abort the rest of the suite;
//! infrastructure faults (unreachable transport, unreadable files) surface
//! as [`InstanceError`] and do abort the run.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::instance::{InstanceError, TargetInstance};

/// Warnings the boot-log scan always tolerates, independent of the
/// scenario's required set. These are routine provisioner chatter on
/// minimal images.
pub const KNOWN_BENIGN_WARNINGS: &[&str] = &[
    "Used fallback datasource",
    "Running module ssh-authkey-fingerprints",
];

/// Outcome of a single verification check.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CheckOutcome {
    /// Observed state matched the expectation.
    Passed,
    /// Observed state did not match; the reason pairs expected and actual.
    Failed {
        /// Expected-versus-actual description of the mismatch.
        reason: String,
    },
    /// The check's precondition was unmet; not a failure.
    Skipped {
        /// Why the check did not apply to this target.
        reason: String,
    },
}

impl CheckOutcome {
    /// Builds a failed outcome from a mismatch description.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Builds a skipped outcome from an applicability description.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Returns `true` unless the outcome is a failure.
    #[must_use]
    pub const fn is_acceptable(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Errors raised while constructing probes.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Raised when an expected pattern is not a valid regular expression.
    #[error("invalid probe pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A read-only command paired with the pattern its output must match.
#[derive(Clone, Debug)]
pub struct Probe {
    args: Vec<String>,
    pattern: Regex,
}

impl Probe {
    /// Creates a probe from command arguments and an expected pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Pattern`] when the pattern does not compile.
    pub fn new<I, S>(args: I, pattern: &str) -> Result<Self, ProbeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            args: args.into_iter().map(Into::into).collect(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Returns the probe command as a display string.
    #[must_use]
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }
}

/// Executes a probe and matches its stdout against the expected pattern.
///
/// Matching uses a regex *search*: the pattern needs to match a substring of
/// the output, not the whole of it.
///
/// # Errors
///
/// Returns [`InstanceError`] when the command cannot be executed at all.
pub fn run_probe<I: TargetInstance>(
    instance: &I,
    probe: &Probe,
) -> Result<CheckOutcome, InstanceError> {
    let args: Vec<&str> = probe.args.iter().map(String::as_str).collect();
    let output = instance.execute(&args)?;

    if probe.pattern.is_match(&output.stdout) {
        return Ok(CheckOutcome::Passed);
    }

    Ok(CheckOutcome::failed(format!(
        "`{}` resulted in '{}', but expected to match regex {}",
        probe.command_line(),
        output.stdout.trim_end(),
        probe.pattern.as_str()
    )))
}

/// Scans the boot log for warning lines and checks them against expectations.
///
/// Every entry in `require_warnings` must appear in some warning line. When
/// `ignore_unexpected` is `false`, any warning line that matches neither the
/// required set nor [`KNOWN_BENIGN_WARNINGS`] fails the check.
///
/// # Errors
///
/// Returns [`InstanceError`] when the boot log cannot be read.
pub fn verify_clean_boot<I: TargetInstance>(
    instance: &I,
    require_warnings: &[String],
    ignore_unexpected: bool,
) -> Result<CheckOutcome, InstanceError> {
    let log = instance.boot_log()?;
    let warnings = warning_lines(&log);

    let mut missing = Vec::new();
    for required in require_warnings {
        if !warnings.iter().any(|line| line.contains(required)) {
            missing.push(required.clone());
        }
    }
    if !missing.is_empty() {
        return Ok(CheckOutcome::failed(format!(
            "expected warnings not found in boot log: {missing:?}; saw: {warnings:?}"
        )));
    }

    if !ignore_unexpected {
        let unexpected: Vec<&str> = warnings
            .iter()
            .copied()
            .filter(|line| {
                !require_warnings.iter().any(|req| line.contains(req))
                    && !KNOWN_BENIGN_WARNINGS
                        .iter()
                        .any(|benign| line.contains(benign))
            })
            .collect();
        if !unexpected.is_empty() {
            return Ok(CheckOutcome::failed(format!(
                "unexpected warnings found in boot log: {unexpected:?}"
            )));
        }
    }

    Ok(CheckOutcome::Passed)
}

/// Applies a state mutation on the instance, then drives a clean reboot so
/// the next boot's reconciliation can be observed.
///
/// # Errors
///
/// Returns [`InstanceError`] when the mutation fails or the instance does
/// not come back from the reboot.
pub async fn mutate_and_restart<I: TargetInstance>(
    instance: &I,
    mutation: &str,
) -> Result<(), InstanceError> {
    let output = instance.execute_shell(mutation)?;
    if !output.is_success() {
        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        return Err(InstanceError::CommandFailure {
            command: mutation.to_owned(),
            status: output.code,
            status_text,
            stderr: output.stderr,
        });
    }
    instance.clean()?;
    instance.restart().await
}

/// Extracts provisioner warning lines from boot log contents.
#[must_use]
pub fn warning_lines(log: &str) -> Vec<&str> {
    log.lines()
        .filter(|line| line.contains("[WARNING]"))
        .map(str::trim)
        .collect()
}
