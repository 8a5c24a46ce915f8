//! Unit tests for harness and SSH configuration validation.

use bootprobe::config::{ConfigError, HarnessConfig};
use bootprobe::instance::{InstanceError, SshConfig};
use rstest::*;

#[fixture]
fn harness() -> HarnessConfig {
    HarnessConfig {
        default_image: "Ubuntu 24.04 Noble Numbat".to_owned(),
        default_instance_type: "DEV1-S".to_owned(),
        default_zone: "fr-par-1".to_owned(),
    }
}

#[fixture]
fn ssh() -> SshConfig {
    SshConfig {
        ssh_bin: "ssh".to_owned(),
        ssh_user: "ubuntu".to_owned(),
        boot_log_path: "/var/log/cloud-init.log".to_owned(),
        boot_marker_path: "/var/lib/cloud/instance/boot-finished".to_owned(),
        clean_command: "sudo cloud-init clean --logs".to_owned(),
        reboot_poll_interval_secs: 2,
        reboot_timeout_secs: 600,
    }
}

#[rstest]
fn complete_harness_config_validates(harness: HarnessConfig) {
    assert_eq!(harness.validate(), Ok(()));
}

#[rstest]
fn as_request_carries_configured_defaults(harness: HarnessConfig) {
    let request = harness.as_request().expect("request should build");
    assert_eq!(request.image_label, "Ubuntu 24.04 Noble Numbat");
    assert_eq!(request.instance_type, "DEV1-S");
    assert_eq!(request.zone, "fr-par-1");
    assert_eq!(request.user_data, None);
}

#[rstest]
#[case::image(
    |config: &mut HarnessConfig| config.default_image.clear(),
    "BOOTPROBE_DEFAULT_IMAGE",
    "default_image"
)]
#[case::instance_type(
    |config: &mut HarnessConfig| config.default_instance_type = "   ".to_owned(),
    "BOOTPROBE_DEFAULT_INSTANCE_TYPE",
    "default_instance_type"
)]
#[case::zone(
    |config: &mut HarnessConfig| config.default_zone.clear(),
    "BOOTPROBE_DEFAULT_ZONE",
    "default_zone"
)]
fn missing_harness_field_names_env_var_and_toml_key(
    mut harness: HarnessConfig,
    #[case] blank: fn(&mut HarnessConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    blank(&mut harness);

    let error = harness.validate().expect_err("validation should fail");
    let ConfigError::MissingField(message) = error else {
        panic!("expected MissingField, got: {error:?}");
    };
    assert!(
        message.contains(env_var),
        "message should name the environment variable: {message}"
    );
    assert!(
        message.contains(toml_key),
        "message should name the toml key: {message}"
    );
    assert!(
        message.contains("bootprobe.toml"),
        "message should point at the configuration file: {message}"
    );
}

#[rstest]
fn complete_ssh_config_validates(ssh: SshConfig) {
    assert_eq!(ssh.validate(), Ok(()));
}

#[rstest]
#[case::ssh_bin(|config: &mut SshConfig| config.ssh_bin.clear(), "ssh_bin")]
#[case::ssh_user(|config: &mut SshConfig| config.ssh_user = " ".to_owned(), "ssh_user")]
#[case::boot_log(|config: &mut SshConfig| config.boot_log_path.clear(), "boot_log_path")]
#[case::boot_marker(
    |config: &mut SshConfig| config.boot_marker_path.clear(),
    "boot_marker_path"
)]
#[case::clean_command(|config: &mut SshConfig| config.clean_command.clear(), "clean_command")]
#[case::poll_interval(
    |config: &mut SshConfig| config.reboot_poll_interval_secs = 0,
    "reboot_poll_interval_secs"
)]
#[case::timeout(|config: &mut SshConfig| config.reboot_timeout_secs = 0, "reboot_timeout_secs")]
fn invalid_ssh_config_names_offending_field(
    mut ssh: SshConfig,
    #[case] corrupt: fn(&mut SshConfig),
    #[case] expected_field: &str,
) {
    corrupt(&mut ssh);

    let error = ssh.validate().expect_err("validation should fail");
    assert_eq!(
        error,
        InstanceError::InvalidConfig {
            field: expected_field.to_owned(),
        }
    );
}
