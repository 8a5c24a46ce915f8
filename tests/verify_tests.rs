//! Unit tests for probe execution and boot-log verification.

use bootprobe::instance::{CommandOutput, InstanceError};
use bootprobe::test_support::FakeInstance;
use bootprobe::verify::{
    CheckOutcome, Probe, mutate_and_restart, run_probe, verify_clean_boot, warning_lines,
};
use rstest::*;

const WARNING_PREFIX: &str = "2026-01-05 10:11:12,130 - util.py[WARNING]:";

fn warning_line(message: &str) -> String {
    format!("{WARNING_PREFIX} {message}")
}

#[fixture]
fn instance() -> FakeInstance {
    FakeInstance::new()
}

#[rstest]
fn probe_passes_on_substring_match(instance: FakeInstance) {
    instance.set_exec_stdout(
        &["getent", "passwd", "eric"],
        "eric:x:1742:1742::/home/eric:/bin/sh\n",
    );
    let probe = Probe::new(["getent", "passwd", "eric"], r"eric:x:1742:").expect("valid pattern");

    let outcome = run_probe(&instance, &probe).expect("probe should execute");
    assert_eq!(outcome, CheckOutcome::Passed);
}

#[rstest]
fn probe_failure_reports_expected_and_actual(instance: FakeInstance) {
    instance.set_exec_stdout(&["getent", "passwd", "eric"], "eric:x:1001:\n");
    let probe = Probe::new(["getent", "passwd", "eric"], r"eric:x:1742:").expect("valid pattern");

    let outcome = run_probe(&instance, &probe).expect("probe should execute");
    let CheckOutcome::Failed { reason } = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    assert!(
        reason.contains("getent passwd eric"),
        "reason should name the probe: {reason}"
    );
    assert!(
        reason.contains("eric:x:1001:"),
        "reason should quote the actual output: {reason}"
    );
    assert!(
        reason.contains("eric:x:1742:"),
        "reason should quote the expected pattern: {reason}"
    );
}

#[rstest]
fn probe_on_missing_entry_fails_rather_than_errors(instance: FakeInstance) {
    // FakeInstance answers unscripted commands with exit code 2 and no
    // output, like getent does for an unknown name.
    let probe = Probe::new(["getent", "passwd", "ghost"], r"ghost:x:").expect("valid pattern");

    let outcome = run_probe(&instance, &probe).expect("probe should execute");
    assert!(matches!(outcome, CheckOutcome::Failed { .. }));
}

#[test]
fn probe_rejects_invalid_pattern() {
    assert!(Probe::new(["getent", "group", "x"], r"[unclosed").is_err());
}

#[rstest]
fn clean_boot_passes_when_required_warning_present(instance: FakeInstance) {
    instance.set_boot_log(format!(
        "2026-01-05 10:11:11,000 - modules.py[DEBUG]: running users_groups\n{}\n",
        warning_line("Not unlocking password for user nopassworduser.")
    ));

    let outcome = verify_clean_boot(
        &instance,
        &["Not unlocking password for user nopassworduser.".to_owned()],
        false,
    )
    .expect("boot log should be readable");
    assert_eq!(outcome, CheckOutcome::Passed);
}

#[rstest]
fn clean_boot_fails_when_required_warning_missing(instance: FakeInstance) {
    instance.set_boot_log("all quiet\n");

    let outcome = verify_clean_boot(
        &instance,
        &["Not unlocking password for user nopassworduser.".to_owned()],
        false,
    )
    .expect("boot log should be readable");
    let CheckOutcome::Failed { reason } = outcome else {
        panic!("expected a failure");
    };
    assert!(
        reason.contains("nopassworduser"),
        "reason should name the missing warning: {reason}"
    );
}

#[rstest]
fn clean_boot_fails_on_unexpected_warning(instance: FakeInstance) {
    instance.set_boot_log(warning_line("something novel went wrong"));

    let outcome = verify_clean_boot(&instance, &[], false).expect("boot log should be readable");
    let CheckOutcome::Failed { reason } = outcome else {
        panic!("expected a failure");
    };
    assert!(
        reason.contains("something novel went wrong"),
        "reason should quote the unexpected warning: {reason}"
    );
}

#[rstest]
fn clean_boot_ignores_unexpected_warnings_when_asked(instance: FakeInstance) {
    instance.set_boot_log(warning_line("something novel went wrong"));

    let outcome = verify_clean_boot(&instance, &[], true).expect("boot log should be readable");
    assert_eq!(outcome, CheckOutcome::Passed);
}

#[rstest]
fn clean_boot_tolerates_known_benign_warnings(instance: FakeInstance) {
    instance.set_boot_log(warning_line("Used fallback datasource"));

    let outcome = verify_clean_boot(&instance, &[], false).expect("boot log should be readable");
    assert_eq!(outcome, CheckOutcome::Passed);
}

#[test]
fn warning_lines_keeps_only_warning_entries() {
    let log = format!(
        "one[DEBUG]: fine\n{}\ntwo[INFO]: fine\n{}\n",
        warning_line("first"),
        warning_line("second")
    );
    let lines = warning_lines(&log);
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|line| line.contains("[WARNING]")));
}

#[tokio::test]
async fn mutate_and_restart_cleans_then_reboots() {
    let instance = FakeInstance::new();

    mutate_and_restart(&instance, "sudo passwd -d foobar")
        .await
        .expect("mutation should succeed");

    assert_eq!(instance.shell_history(), vec!["sudo passwd -d foobar"]);
    assert_eq!(instance.cleans(), 1);
    assert_eq!(instance.restarts(), 1);
}

#[tokio::test]
async fn mutate_and_restart_surfaces_failed_mutation() {
    let instance = FakeInstance::new();
    instance.set_shell_output(
        "sudo passwd -d foobar",
        CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: String::from("passwd: user 'foobar' does not exist"),
        },
    );

    let error = mutate_and_restart(&instance, "sudo passwd -d foobar")
        .await
        .expect_err("failed mutation must error");
    assert!(matches!(error, InstanceError::CommandFailure { .. }));
    assert_eq!(instance.cleans(), 0, "clean must not run after a failed mutation");
    assert_eq!(instance.restarts(), 0);
}
