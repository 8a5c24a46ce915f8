//! Core library for the bootprobe verification harness.
//!
//! The crate boots (or attaches to) an instance provisioned with a
//! declarative cloud-config payload, probes the resulting system state over
//! SSH, and reports pass/fail/skip outcomes per check. The provisioning
//! system itself is treated as a black box; instance lifecycle management
//! sits behind the [`Backend`] trait.

pub mod backend;
pub mod config;
pub mod instance;
pub mod release;
pub mod suite;
pub mod test_support;
pub mod user_data;
pub mod users_groups;
pub mod verify;

pub use backend::{
    Backend, BackendError, InstanceHandle, InstanceNetworking, InstanceRequest,
    InstanceRequestBuilder,
};
pub use config::{ConfigError, HarnessConfig};
pub use instance::{
    CommandOutput, CommandRunner, InstanceError, ProcessCommandRunner, SshConfig, SshInstance,
    TargetInstance,
};
pub use release::{FOCAL, JAMMY, NOBLE, ORACULAR, PLUCKY, ReleaseInfo, ReleaseVersion};
pub use suite::{
    Check, CheckFuture, CheckReport, Suite, SuiteContext, SuiteError, SuiteReport, SuiteRunner,
    run_checks,
};
pub use user_data::{
    CloudConfig, GroupSpec, SudoDirective, UserDataError, UserEntry, UserSpec, resolve_user_data,
    sample_users_groups,
};
pub use verify::{
    CheckOutcome, Probe, ProbeError, mutate_and_restart, run_probe, verify_clean_boot,
};
