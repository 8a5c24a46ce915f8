//! Declarative cloud-config payload construction and resolution.
//!
//! The harness hands the provisioner under test a `#cloud-config` document
//! describing groups and users. This module models that document as typed
//! data, renders it to YAML, and resolves payloads supplied either inline
//! or via a file path so CLI and configuration paths stay consistent.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Header line the provisioner requires on declarative payloads.
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Errors raised while building or resolving user-data payloads.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum UserDataError {
    /// Raised when both inline and file sources are provided.
    #[error("user-data cannot be provided both inline and via file")]
    BothProvided,
    /// Raised when an inline payload is empty or only whitespace.
    #[error("user-data must not be empty")]
    InlineEmpty,
    /// Raised when a file path is empty or only whitespace.
    #[error("user-data file path must not be empty")]
    FilePathEmpty,
    /// Raised when a file resolves to empty or only whitespace.
    #[error("user-data file must not be empty")]
    FileEmpty,
    /// Raised when reading the file source fails.
    #[error("failed to read user-data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a document cannot be serialised or parsed as YAML.
    #[error("invalid cloud-config document: {0}")]
    Document(String),
}

/// A group declaration: a name plus optional seed members.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GroupSpec {
    /// Group name as it should appear in the group database.
    pub name: String,
    /// Usernames added to the group when it is created.
    pub members: Vec<String>,
}

impl GroupSpec {
    /// Declares a group with no seed members.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Declares a group seeded with the given members.
    #[must_use]
    pub fn with_members<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }
}

// Groups render as a bare string when empty and as `name: [members]`
// otherwise, matching the document format the provisioner accepts.
impl Serialize for GroupSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.members.is_empty() {
            serializer.serialize_str(&self.name)
        } else {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry(&self.name, &self.members)?;
            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for GroupSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Seeded(std::collections::BTreeMap<String, Vec<String>>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => Ok(Self::named(name)),
            Raw::Seeded(map) => {
                let mut entries = map.into_iter();
                let Some((name, members)) = entries.next() else {
                    return Err(D::Error::custom("group mapping must not be empty"));
                };
                if entries.next().is_some() {
                    return Err(D::Error::custom(
                        "group mapping must contain exactly one name",
                    ));
                }
                Ok(Self { name, members })
            }
        }
    }
}

/// Privilege-escalation directive attached to a user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SudoDirective {
    /// Explicitly deny any managed sudoers entry (`sudo: null`).
    Deny,
    /// Grant the given sudoers rule via the managed fragment.
    Grant(String),
}

impl Serialize for SudoDirective {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Deny => serializer.serialize_unit(),
            Self::Grant(rule) => serializer.serialize_str(rule),
        }
    }
}

// A present-but-null `sudo:` key means deny, while an absent key leaves the
// provisioner's default in place, so the field cannot be a plain Option.
fn deserialize_sudo<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SudoDirective>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(Some(raw.map_or(SudoDirective::Deny, SudoDirective::Grant)))
}

// Supplementary groups may be written as a single name or a list.
fn deserialize_groups<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    match Raw::deserialize(deserializer)? {
        Raw::One(name) => Ok(vec![name]),
        Raw::Many(names) => Ok(names),
    }
}

/// A single user declaration within the payload.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UserSpec {
    /// Login name for the account.
    pub name: String,
    /// GECOS comment field (typically the full name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gecos: Option<String>,
    /// Primary group; the provisioner creates it when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_group: Option<String>,
    /// Supplementary groups the user joins.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_groups"
    )]
    pub groups: Vec<String>,
    /// Pre-hashed password written to the shadow database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,
    /// Plain text password, hashed by the provisioner before use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_text_passwd: Option<String>,
    /// Alternative spelling for a pre-hashed password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_passwd: Option<String>,
    /// Whether the password is locked; `false` requests an unlocked account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_passwd: Option<bool>,
    /// Account expiry date in `YYYY-MM-DD` form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiredate: Option<String>,
    /// Days after password expiry before the account is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive: Option<String>,
    /// Explicit numeric uid for the account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Sudo directive: absent leaves the default, `Deny` suppresses the
    /// managed sudoers entry, `Grant` installs the given rule.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_sudo"
    )]
    pub sudo: Option<SudoDirective>,
    /// Marks the account as a system account (no home directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<bool>,
}

impl UserSpec {
    /// Starts a user declaration with only a name set.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// An entry in the payload's user list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEntry {
    /// The distribution's default user (rendered as the string `default`).
    Default,
    /// A fully specified user.
    User(UserSpec),
}

impl Serialize for UserEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Default => serializer.serialize_str("default"),
            Self::User(spec) => spec.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for UserEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Spec(UserSpec),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) if name == "default" => Ok(Self::Default),
            Raw::Name(name) => Err(D::Error::custom(format!(
                "bare user entry `{name}` is not supported; use `default` or a mapping"
            ))),
            Raw::Spec(spec) => Ok(Self::User(spec)),
        }
    }
}

/// A declarative cloud-config document listing groups and users.
///
/// Groups are applied before users so that user declarations may reference
/// freshly created groups.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CloudConfig {
    /// Groups to create, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupSpec>,
    /// Users to create after the groups exist.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserEntry>,
}

impl CloudConfig {
    /// Renders the document as a `#cloud-config` payload.
    ///
    /// # Errors
    ///
    /// Returns [`UserDataError::Document`] when YAML serialisation fails.
    pub fn render(&self) -> Result<String, UserDataError> {
        let body =
            serde_yaml::to_string(self).map_err(|err| UserDataError::Document(err.to_string()))?;
        Ok(format!("{CLOUD_CONFIG_HEADER}\n{body}"))
    }

    /// Parses a payload, tolerating a leading `#cloud-config` header.
    ///
    /// # Errors
    ///
    /// Returns [`UserDataError::Document`] when the YAML body is invalid.
    pub fn parse(payload: &str) -> Result<Self, UserDataError> {
        serde_yaml::from_str(payload).map_err(|err| UserDataError::Document(err.to_string()))
    }
}

/// The canonical users/groups payload exercised by the verification suite.
///
/// Declares a `secret` group seeded with root, a plain `cloud-users` group,
/// the distro default user, and a spread of accounts covering gecos fields,
/// explicit uids, locked and unlocked passwords, sudo grant/deny, and a
/// system account.
#[must_use]
pub fn sample_users_groups() -> CloudConfig {
    let foobar = UserSpec {
        gecos: Some("Foo B. Bar".to_owned()),
        primary_group: Some("foobar".to_owned()),
        groups: vec!["users".to_owned()],
        expiredate: Some("2038-01-19".to_owned()),
        lock_passwd: Some(false),
        passwd: Some(
            "$6$j212wezy$7H/1LT4f9/N3wpgNunhsIqtMj62OKiS3nyNwuizouQc3u7MbYCarYe\
             AHWYPYb2FT.lbioDm2RrkJPb9BZMN1O/"
                .to_owned(),
        ),
        ..UserSpec::named("foobar")
    };
    let barfoo = UserSpec {
        gecos: Some("Bar B. Foo".to_owned()),
        sudo: Some(SudoDirective::Grant("ALL=(ALL) NOPASSWD:ALL".to_owned())),
        groups: vec!["cloud-users".to_owned(), "secret".to_owned()],
        lock_passwd: Some(true),
        ..UserSpec::named("barfoo")
    };
    let nopassworduser = UserSpec {
        gecos: Some("I do not like passwords".to_owned()),
        lock_passwd: Some(false),
        ..UserSpec::named("nopassworduser")
    };
    let cloudy = UserSpec {
        gecos: Some("Magic Cloud App Daemon User".to_owned()),
        inactive: Some("0".to_owned()),
        system: Some(true),
        ..UserSpec::named("cloudy")
    };
    let eric = UserSpec {
        sudo: Some(SudoDirective::Deny),
        uid: Some(1742),
        ..UserSpec::named("eric")
    };
    let archivist = UserSpec {
        uid: Some(1743),
        ..UserSpec::named("archivist")
    };

    CloudConfig {
        groups: vec![
            GroupSpec::with_members("secret", ["root"]),
            GroupSpec::named("cloud-users"),
        ],
        users: vec![
            UserEntry::Default,
            UserEntry::User(foobar),
            UserEntry::User(barfoo),
            UserEntry::User(nopassworduser),
            UserEntry::User(cloudy),
            UserEntry::User(eric),
            UserEntry::User(archivist),
        ],
    }
}

/// Resolves a user-data payload from either an inline value or a file.
///
/// Inline and file sources are mutually exclusive. Both values are trimmed
/// for emptiness checks, but the returned payload preserves the original
/// content.
///
/// # Errors
///
/// Returns [`UserDataError`] when the inputs are invalid or the file cannot
/// be read.
pub fn resolve_user_data(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, UserDataError> {
    if inline.is_some() && file.is_some() {
        return Err(UserDataError::BothProvided);
    }

    if let Some(payload) = inline {
        validate_payload(payload)?;
        return Ok(Some(payload.to_owned()));
    }

    let Some(path) = file else {
        return Ok(None);
    };

    if path.trim().is_empty() {
        return Err(UserDataError::FilePathEmpty);
    }

    let expanded = expand_tilde(path);
    let content = read_to_string_ambient(&expanded).map_err(|message| UserDataError::FileRead {
        path: expanded.clone(),
        message,
    })?;

    validate_payload(&content).map_err(|err| match err {
        UserDataError::InlineEmpty => UserDataError::FileEmpty,
        other => other,
    })?;

    Ok(Some(content))
}

/// Validates that a user-data payload is not empty/whitespace.
pub(crate) fn validate_payload(payload: &str) -> Result<(), UserDataError> {
    if payload.trim().is_empty() {
        return Err(UserDataError::InlineEmpty);
    }
    Ok(())
}

/// Expands a leading `~/` using the `HOME` environment variable.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}
