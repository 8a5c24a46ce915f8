//! Target release identification and ordering.
//!
//! Some expected boot warnings only appear on releases newer than a named
//! baseline, and some probes assume the Ubuntu default user exists. The
//! harness therefore parses `/etc/os-release` from the target and exposes a
//! comparable release ordinal plus a distribution-family flag.

use thiserror::Error;

/// A release ordinal in `year.month` form, totally ordered by age.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ReleaseVersion {
    /// Two-digit release year (for example `24`).
    pub year: u16,
    /// Release month (for example `4`).
    pub month: u8,
}

impl ReleaseVersion {
    /// Creates a release ordinal from its year and month parts.
    #[must_use]
    pub const fn new(year: u16, month: u8) -> Self {
        Self { year, month }
    }
}

impl std::fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.year, self.month)
    }
}

/// Ubuntu 20.04 LTS (Focal Fossa).
pub const FOCAL: ReleaseVersion = ReleaseVersion::new(20, 4);
/// Ubuntu 22.04 LTS (Jammy Jellyfish).
pub const JAMMY: ReleaseVersion = ReleaseVersion::new(22, 4);
/// Ubuntu 24.04 LTS (Noble Numbat).
pub const NOBLE: ReleaseVersion = ReleaseVersion::new(24, 4);
/// Ubuntu 24.10 (Oracular Oriole).
pub const ORACULAR: ReleaseVersion = ReleaseVersion::new(24, 10);
/// Ubuntu 25.04 (Plucky Puffin).
pub const PLUCKY: ReleaseVersion = ReleaseVersion::new(25, 4);

/// Errors raised while identifying the target release.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ReleaseError {
    /// Raised when `/etc/os-release` lacks a required key.
    #[error("os-release is missing the {0} key")]
    MissingKey(&'static str),
    /// Raised when the version identifier cannot be parsed.
    #[error("unparseable VERSION_ID `{0}`")]
    BadVersion(String),
}

/// Identity of the release running on the target instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseInfo {
    /// Distribution identifier (the `ID` key, for example `ubuntu`).
    pub distro_id: String,
    /// Release series codename when published (`VERSION_CODENAME`).
    pub series: Option<String>,
    /// Comparable release ordinal parsed from `VERSION_ID`.
    pub version: ReleaseVersion,
    /// Whether the target belongs to the Ubuntu family (`ID` or `ID_LIKE`).
    pub is_ubuntu: bool,
}

impl ReleaseInfo {
    /// Parses release identity from `/etc/os-release` contents.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError`] when the `ID` or `VERSION_ID` keys are
    /// missing or malformed.
    pub fn from_os_release(contents: &str) -> Result<Self, ReleaseError> {
        let distro_id =
            lookup_key(contents, "ID").ok_or(ReleaseError::MissingKey("ID"))?;
        let version_id =
            lookup_key(contents, "VERSION_ID").ok_or(ReleaseError::MissingKey("VERSION_ID"))?;
        let series = lookup_key(contents, "VERSION_CODENAME");
        let id_like = lookup_key(contents, "ID_LIKE").unwrap_or_default();

        let version = parse_version(&version_id)?;
        let is_ubuntu =
            distro_id == "ubuntu" || id_like.split_whitespace().any(|word| word == "ubuntu");

        Ok(Self {
            distro_id,
            series,
            version,
            is_ubuntu,
        })
    }
}

fn lookup_key(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let (candidate, value) = line.split_once('=')?;
        if candidate.trim() != key {
            return None;
        }
        Some(unquote(value.trim()).to_owned())
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_version(version_id: &str) -> Result<ReleaseVersion, ReleaseError> {
    let bad = || ReleaseError::BadVersion(version_id.to_owned());
    // Point releases like "24.04.1" carry a patch component after the month;
    // single-component identifiers like Debian's "12" carry no month at all.
    let (year_text, month_text) = match version_id.split_once('.') {
        Some((year, rest)) => (year, rest.split('.').next().unwrap_or("0")),
        None => (version_id, "0"),
    };

    let year = year_text.parse::<u16>().map_err(|_| bad())?;
    let month = month_text.parse::<u8>().map_err(|_| bad())?;
    Ok(ReleaseVersion::new(year, month))
}
