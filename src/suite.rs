//! Ordered verification suites sharing one live instance.
//!
//! A suite pairs a declarative payload with a sequence of named checks. The
//! runner boots exactly one instance per suite and executes the checks in
//! declaration order against it; later checks may deliberately observe state
//! mutated by earlier ones, so the runner never reorders or parallelises.
//! Teardown is always attempted, and a teardown failure is surfaced even
//! when every check passed.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{Backend, InstanceHandle, InstanceRequest};
use crate::instance::{
    CommandRunner, InstanceError, ProcessCommandRunner, SshConfig, SshInstance, TargetInstance,
};
use crate::release::{ReleaseError, ReleaseInfo};
use crate::user_data::{CloudConfig, UserDataError};
use crate::verify::CheckOutcome;

/// Shared fixture state every check in a suite runs against.
#[derive(Debug)]
pub struct SuiteContext<I: TargetInstance> {
    /// The live instance under inspection.
    pub instance: I,
    /// Release identity of the target, used for applicability gates.
    pub release: ReleaseInfo,
}

/// Future returned by a check.
pub type CheckFuture<'a> = Pin<Box<dyn Future<Output = Result<CheckOutcome, InstanceError>> + 'a>>;

/// A named verification step run against the shared suite context.
pub trait Check<I: TargetInstance> {
    /// Stable name used in reports.
    fn name(&self) -> &str;

    /// Runs the check; failures are reported, infrastructure faults abort.
    fn run<'a>(&'a self, cx: &'a SuiteContext<I>) -> CheckFuture<'a>;
}

/// A declarative payload plus the ordered checks that verify its effects.
pub struct Suite<I: TargetInstance> {
    /// Suite name used in reports and logging.
    pub name: String,
    /// Payload handed to the provisioner at instance creation.
    pub user_data: CloudConfig,
    /// Checks executed in declaration order against one shared instance.
    pub checks: Vec<Box<dyn Check<I>>>,
}

/// Outcome of one named check.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct CheckReport {
    /// Check name as declared by the suite.
    pub name: String,
    /// What the check observed.
    pub outcome: CheckOutcome,
}

/// Aggregated results for a whole suite run.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct SuiteReport {
    /// Suite name.
    pub suite: String,
    /// Per-check outcomes in execution order.
    pub checks: Vec<CheckReport>,
}

impl SuiteReport {
    /// Number of checks that passed.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(|outcome| matches!(outcome, CheckOutcome::Passed))
    }

    /// Number of checks that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, CheckOutcome::Failed { .. }))
    }

    /// Number of checks skipped because a precondition was unmet.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, CheckOutcome::Skipped { .. }))
    }

    /// Returns `true` when no check failed (skips are acceptable).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.checks.iter().all(|check| check.outcome.is_acceptable())
    }

    fn count(&self, predicate: impl Fn(&CheckOutcome) -> bool) -> usize {
        self.checks
            .iter()
            .filter(|check| predicate(&check.outcome))
            .count()
    }
}

/// Errors surfaced while running a suite end to end.
#[derive(Debug, Error)]
pub enum SuiteError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when the payload cannot be rendered.
    #[error("failed to render user-data payload: {0}")]
    Payload(#[from] UserDataError),
    /// Raised when provisioning a new instance fails.
    #[error("failed to create instance: {0}")]
    Provision(#[source] BackendError),
    /// Raised when the instance does not become reachable over SSH.
    #[error("instance did not become ready: {message}")]
    Wait {
        /// Human-readable description of the failure.
        message: String,
        /// Provider-specific error.
        #[source]
        source: BackendError,
    },
    /// Raised when talking to the instance fails mid-suite.
    #[error("instance interaction failed: {message}")]
    Instance {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying transport error.
        #[source]
        source: InstanceError,
    },
    /// Raised when the target release cannot be identified.
    #[error("failed to identify target release: {message}")]
    Release {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying parse error.
        #[source]
        source: ReleaseError,
    },
    /// Raised when teardown fails after the primary operation succeeded.
    #[error("failed to destroy instance: {0}")]
    Teardown(#[source] BackendError),
}

/// Runs every check of a suite, in order, against an existing context.
///
/// Check failures and skips are recorded in the report; only transport-level
/// faults abort the run.
///
/// # Errors
///
/// Returns [`InstanceError`] when a check cannot reach the instance.
pub async fn run_checks<I: TargetInstance>(
    suite: &Suite<I>,
    cx: &SuiteContext<I>,
) -> Result<SuiteReport, InstanceError> {
    let mut report = SuiteReport {
        suite: suite.name.clone(),
        checks: Vec::with_capacity(suite.checks.len()),
    };

    for check in &suite.checks {
        let outcome = check.run(cx).await?;
        match &outcome {
            CheckOutcome::Passed => info!(check = check.name(), "check passed"),
            CheckOutcome::Failed { reason } => {
                warn!(check = check.name(), reason, "check failed");
            }
            CheckOutcome::Skipped { reason } => {
                info!(check = check.name(), reason, "check skipped");
            }
        }
        report.checks.push(CheckReport {
            name: check.name().to_owned(),
            outcome,
        });
    }

    Ok(report)
}

/// Boots one instance per suite, runs the checks, and always tears down.
#[derive(Debug)]
pub struct SuiteRunner<B, R: CommandRunner + Clone> {
    backend: B,
    ssh_config: SshConfig,
    runner: R,
}

impl<B> SuiteRunner<B, ProcessCommandRunner>
where
    B: Backend,
    B::Error: Display + Send + Sync + std::error::Error + 'static,
{
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub const fn with_process_runner(backend: B, ssh_config: SshConfig) -> Self {
        Self::new(backend, ssh_config, ProcessCommandRunner)
    }
}

impl<B, R> SuiteRunner<B, R>
where
    B: Backend,
    B::Error: Display + Send + Sync + std::error::Error + 'static,
    R: CommandRunner + Clone,
{
    /// Creates a new runner using the provided command transport.
    #[must_use]
    pub const fn new(backend: B, ssh_config: SshConfig, runner: R) -> Self {
        Self {
            backend,
            ssh_config,
            runner,
        }
    }

    /// Provisions an instance with the suite's payload, verifies it, and
    /// destroys it.
    ///
    /// The `request` supplies image, type, and zone; its user-data is
    /// replaced with the suite's rendered payload.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError`] when provisioning, readiness, release
    /// detection, a check's transport, or teardown fail.
    pub async fn execute(
        &self,
        request: &InstanceRequest,
        suite: &Suite<SshInstance<R>>,
    ) -> Result<SuiteReport, SuiteError<B::Error>> {
        let payload = suite.user_data.render()?;
        let mut provision_request = request.clone();
        provision_request.user_data = Some(payload);

        info!(suite = suite.name, "provisioning instance");
        let handle = self
            .backend
            .create(&provision_request)
            .await
            .map_err(SuiteError::Provision)?;

        let networking = match self.backend.wait_for_ready(&handle).await {
            Ok(net) => net,
            Err(err) => {
                let message = self.destroy_with_note(&handle, &err).await;
                return Err(SuiteError::Wait {
                    message,
                    source: err,
                });
            }
        };

        let cx = match self.build_context(networking).await {
            Ok(cx) => cx,
            Err(err) => {
                let message = self.destroy_with_note(&handle, &err).await;
                return Err(match err {
                    ContextError::Instance(source) => SuiteError::Instance { message, source },
                    ContextError::Release(source) => SuiteError::Release { message, source },
                });
            }
        };

        let report = match run_checks(suite, &cx).await {
            Ok(report) => report,
            Err(err) => {
                let message = self.destroy_with_note(&handle, &err).await;
                return Err(SuiteError::Instance {
                    message,
                    source: err,
                });
            }
        };

        self.backend
            .destroy(handle)
            .await
            .map_err(SuiteError::Teardown)?;

        Ok(report)
    }

    async fn build_context(
        &self,
        networking: crate::backend::InstanceNetworking,
    ) -> Result<SuiteContext<SshInstance<R>>, ContextError> {
        let instance =
            SshInstance::new(self.ssh_config.clone(), networking, self.runner.clone())
                .map_err(ContextError::Instance)?;

        // First boot: provisioning must finish before anything is probed.
        instance.wait_for_boot().await.map_err(ContextError::Instance)?;

        let os_release = instance
            .read_from_file("/etc/os-release")
            .map_err(ContextError::Instance)?;
        let release = ReleaseInfo::from_os_release(&os_release).map_err(ContextError::Release)?;
        info!(
            distro = release.distro_id,
            version = %release.version,
            "identified target release"
        );

        Ok(SuiteContext { instance, release })
    }

    async fn destroy_with_note<E: Display>(&self, handle: &InstanceHandle, err: &E) -> String {
        let teardown_error = self.backend.destroy(handle.clone()).await.err();
        append_teardown_note(err.to_string(), teardown_error.as_ref())
    }
}

fn append_teardown_note<E: Display>(mut message: String, teardown_error: Option<&E>) -> String {
    if let Some(teardown) = teardown_error {
        message = format!("{message} (teardown also failed: {teardown})");
    }
    message
}

enum ContextError {
    Instance(InstanceError),
    Release(ReleaseError),
}

impl Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instance(err) => err.fmt(f),
            Self::Release(err) => err.fmt(f),
        }
    }
}
