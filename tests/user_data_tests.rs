//! Unit tests for cloud-config payload construction and resolution.

use bootprobe::user_data::{
    CLOUD_CONFIG_HEADER, CloudConfig, GroupSpec, SudoDirective, UserDataError, UserEntry,
    UserSpec, resolve_user_data, sample_users_groups,
};
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn sample() -> CloudConfig {
    sample_users_groups()
}

#[rstest]
fn rendered_payload_starts_with_cloud_config_header(sample: CloudConfig) {
    let payload = sample.render().expect("sample payload should render");
    assert!(
        payload.starts_with(&format!("{CLOUD_CONFIG_HEADER}\n")),
        "payload should start with the header, got: {payload}"
    );
}

#[rstest]
fn seeded_group_renders_as_mapping(sample: CloudConfig) {
    let payload = sample.render().expect("sample payload should render");
    assert!(
        payload.contains("secret:"),
        "seeded group should render as a mapping: {payload}"
    );
    assert!(
        payload.contains("- root"),
        "seed member should be listed: {payload}"
    );
}

#[rstest]
fn bare_group_renders_as_string(sample: CloudConfig) {
    let payload = sample.render().expect("sample payload should render");
    assert!(
        payload.contains("- cloud-users"),
        "memberless group should render as a bare string: {payload}"
    );
    assert!(
        !payload.contains("cloud-users:"),
        "memberless group must not render as a mapping: {payload}"
    );
}

#[rstest]
fn default_user_renders_as_string(sample: CloudConfig) {
    let payload = sample.render().expect("sample payload should render");
    assert!(
        payload.contains("- default"),
        "the default user should render as a bare string: {payload}"
    );
}

#[rstest]
fn sudo_deny_renders_as_null(sample: CloudConfig) {
    let payload = sample.render().expect("sample payload should render");
    assert!(
        payload.contains("sudo: null") || payload.contains("sudo: ~"),
        "explicit sudo denial should render as YAML null: {payload}"
    );
}

#[rstest]
fn payload_round_trips_through_yaml(sample: CloudConfig) {
    let payload = sample.render().expect("sample payload should render");
    let parsed = CloudConfig::parse(&payload).expect("rendered payload should parse");
    assert_eq!(parsed, sample);
}

#[test]
fn parse_accepts_single_string_supplementary_group() {
    let document = "users:\n  - name: foobar\n    groups: users\n";
    let parsed = CloudConfig::parse(document).expect("single group name should parse");
    let Some(UserEntry::User(user)) = parsed.users.first() else {
        panic!("expected a user entry");
    };
    assert_eq!(user.groups, vec!["users".to_owned()]);
}

#[test]
fn parse_maps_null_sudo_to_deny() {
    let document = "users:\n  - name: eric\n    sudo: null\n    uid: 1742\n";
    let parsed = CloudConfig::parse(document).expect("null sudo should parse");
    let Some(UserEntry::User(user)) = parsed.users.first() else {
        panic!("expected a user entry");
    };
    assert_eq!(user.sudo, Some(SudoDirective::Deny));
    assert_eq!(user.uid, Some(1742));
}

#[test]
fn parse_rejects_unknown_bare_user_entry() {
    let document = "users:\n  - somebody\n";
    let error = CloudConfig::parse(document).expect_err("bare usernames are unsupported");
    assert!(matches!(error, UserDataError::Document(_)));
}

#[test]
fn sample_payload_declares_expected_accounts() {
    let config = sample_users_groups();
    assert_eq!(
        config.groups,
        vec![
            GroupSpec::with_members("secret", ["root"]),
            GroupSpec::named("cloud-users"),
        ]
    );

    let names: Vec<&str> = config
        .users
        .iter()
        .map(|entry| match entry {
            UserEntry::Default => "default",
            UserEntry::User(UserSpec { name, .. }) => name.as_str(),
        })
        .collect();
    assert_eq!(
        names,
        vec![
            "default",
            "foobar",
            "barfoo",
            "nopassworduser",
            "cloudy",
            "eric",
            "archivist",
        ]
    );
}

#[test]
fn resolve_returns_none_without_sources() {
    let resolved = resolve_user_data(None, None).expect("no sources should resolve");
    assert_eq!(resolved, None);
}

#[test]
fn resolve_rejects_both_sources() {
    let error = resolve_user_data(Some("#cloud-config"), Some("payload.yaml"))
        .expect_err("both sources must be rejected");
    assert_eq!(error, UserDataError::BothProvided);
}

#[rstest]
#[case("")]
#[case("   \n\t")]
fn resolve_rejects_blank_inline_payload(#[case] payload: &str) {
    let error = resolve_user_data(Some(payload), None).expect_err("blank payload must fail");
    assert_eq!(error, UserDataError::InlineEmpty);
}

#[test]
fn resolve_reads_payload_from_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("user-data.yaml");
    std::fs::write(&path, "#cloud-config\ngroups:\n  - cloud-users\n").expect("write payload");

    let resolved = resolve_user_data(None, path.to_str())
        .expect("file payload should resolve")
        .expect("payload should be present");
    assert!(resolved.starts_with("#cloud-config"));
}

#[test]
fn resolve_reports_missing_file_with_path() {
    let error = resolve_user_data(None, Some("/nonexistent/bootprobe-user-data.yaml"))
        .expect_err("missing file must fail");
    let UserDataError::FileRead { path, .. } = error else {
        panic!("expected FileRead error");
    };
    assert_eq!(path, "/nonexistent/bootprobe-user-data.yaml");
}

#[test]
fn resolve_rejects_empty_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("empty.yaml");
    std::fs::write(&path, "  \n").expect("write payload");

    let error =
        resolve_user_data(None, path.to_str()).expect_err("empty file payload must fail");
    assert_eq!(error, UserDataError::FileEmpty);
}
