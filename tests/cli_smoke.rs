//! End-to-end smoke tests for the `bootprobe` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn bootprobe() -> Command {
    Command::cargo_bin("bootprobe").expect("binary should be built")
}

#[test]
fn bare_invocation_prints_help_and_fails() {
    bootprobe()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_subcommands() {
    bootprobe()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("plan"));
}

#[test]
fn render_emits_cloud_config_payload() {
    bootprobe()
        .arg("render")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("#cloud-config\n"))
        .stdout(predicate::str::contains("name: eric"))
        .stdout(predicate::str::contains("uid: 1742"));
}

#[test]
fn render_rejects_unknown_suite() {
    bootprobe()
        .args(["render", "--suite", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown suite `does-not-exist`"));
}

#[test]
fn plan_prints_the_instance_request() {
    bootprobe()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("image_label="))
        .stdout(predicate::str::contains("instance_type="))
        .stdout(predicate::str::contains("zone="))
        .stdout(predicate::str::contains("user_data_size="));
}

#[test]
fn plan_sizes_inline_user_data() {
    bootprobe()
        .args(["plan", "--user-data", "#cloud-config\ngroups:\n  - cloud-users\n"])
        .assert()
        .success()
        .stdout(predicate::str::contains("user_data_size=38"));
}

#[test]
fn plan_rejects_conflicting_user_data_sources() {
    bootprobe()
        .args([
            "plan",
            "--user-data",
            "#cloud-config",
            "--user-data-file",
            "payload.yaml",
        ])
        .assert()
        .failure();
}

#[test]
fn verify_rejects_unparseable_host() {
    bootprobe()
        .args(["verify", "--host", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid host address"));
}
