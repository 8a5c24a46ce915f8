//! Unit tests for target release identification and ordering.

use bootprobe::release::{
    FOCAL, JAMMY, NOBLE, ORACULAR, PLUCKY, ReleaseError, ReleaseInfo, ReleaseVersion,
};
use rstest::*;

const NOBLE_OS_RELEASE: &str = "\
PRETTY_NAME=\"Ubuntu 24.04.1 LTS\"
NAME=\"Ubuntu\"
VERSION_ID=\"24.04\"
VERSION=\"24.04.1 LTS (Noble Numbat)\"
VERSION_CODENAME=noble
ID=ubuntu
ID_LIKE=debian
";

const DEBIAN_OS_RELEASE: &str = "\
PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"
NAME=\"Debian GNU/Linux\"
VERSION_ID=\"12\"
VERSION_CODENAME=bookworm
ID=debian
";

const MINT_OS_RELEASE: &str = "\
NAME=\"Linux Mint\"
VERSION_ID=\"22.1\"
ID=linuxmint
ID_LIKE=\"ubuntu debian\"
";

#[test]
fn parses_ubuntu_noble() {
    let info = ReleaseInfo::from_os_release(NOBLE_OS_RELEASE).expect("noble should parse");
    assert_eq!(info.distro_id, "ubuntu");
    assert_eq!(info.series.as_deref(), Some("noble"));
    assert_eq!(info.version, NOBLE);
    assert!(info.is_ubuntu);
}

#[test]
fn debian_is_not_ubuntu_family() {
    let info = ReleaseInfo::from_os_release(DEBIAN_OS_RELEASE).expect("debian should parse");
    assert_eq!(info.distro_id, "debian");
    assert!(!info.is_ubuntu);
}

// Debian, Fedora, and Arch derivatives publish a bare major version; parsing
// must not error, so non-Ubuntu targets reach the skip gates instead of
// aborting the run.
#[test]
fn single_component_version_id_defaults_the_month() {
    let info = ReleaseInfo::from_os_release(DEBIAN_OS_RELEASE).expect("debian should parse");
    assert_eq!(info.version, ReleaseVersion::new(12, 0));

    let fedora = ReleaseInfo::from_os_release("ID=fedora\nVERSION_ID=40\n")
        .expect("unquoted single component should parse");
    assert_eq!(fedora.version, ReleaseVersion::new(40, 0));
}

#[test]
fn id_like_marks_derivatives_as_ubuntu_family() {
    let info = ReleaseInfo::from_os_release(MINT_OS_RELEASE).expect("mint should parse");
    assert_eq!(info.distro_id, "linuxmint");
    assert!(info.is_ubuntu);
    assert_eq!(info.series, None);
}

#[test]
fn point_release_suffix_is_tolerated() {
    let contents = "ID=ubuntu\nVERSION_ID=\"24.04.1\"\n";
    let info = ReleaseInfo::from_os_release(contents).expect("point release should parse");
    assert_eq!(info.version, NOBLE);
}

#[rstest]
#[case::missing_id("VERSION_ID=\"24.04\"\n", ReleaseError::MissingKey("ID"))]
#[case::missing_version("ID=ubuntu\n", ReleaseError::MissingKey("VERSION_ID"))]
#[case::bad_version(
    "ID=ubuntu\nVERSION_ID=\"noble\"\n",
    ReleaseError::BadVersion("noble".to_owned())
)]
fn rejects_malformed_os_release(#[case] contents: &str, #[case] expected: ReleaseError) {
    let error = ReleaseInfo::from_os_release(contents).expect_err("parse should fail");
    assert_eq!(error, expected);
}

#[test]
fn release_ordinals_order_by_age() {
    assert!(FOCAL < JAMMY);
    assert!(JAMMY < NOBLE);
    assert!(NOBLE < ORACULAR);
    assert!(ORACULAR < PLUCKY);
}

#[test]
fn version_displays_with_zero_padded_month() {
    assert_eq!(NOBLE.to_string(), "24.04");
    assert_eq!(ORACULAR.to_string(), "24.10");
}
