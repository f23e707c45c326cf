//! Session configuration.
//!
//! # Responsibility
//! - Describe optional capabilities (tags, remote backend) and edge-case
//!   policies in one TOML document.
//! - Validate settings before a session is built from them.
//!
//! # Invariants
//! - Every section is optional; an empty document yields the defaults.
//! - A validated config always names a usable remote backend shape.

use crate::model::task::DEFAULT_TAG_LABELS;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_COLLECTION: &str = "todos";
const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_FIRESTORE_DATABASE: &str = "(default)";
const DEFAULT_FIRESTORE_TIMEOUT_SECS: u64 = 10;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config syntax: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// What `add` does with a blank title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlankTitlePolicy {
    /// Drop the request and report nothing.
    #[default]
    Ignore,
    /// Return `ServiceError::BlankTitle`.
    Reject,
}

/// What happens after a remote operation fails.
///
/// Local state is never rolled back under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFailurePolicy {
    /// Log the failure and continue.
    #[default]
    LogAndIgnore,
    /// Log, keep a `SyncFailure` record, and return hydrate errors.
    Surface,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteBackend {
    /// Purely in-memory list; nothing is mirrored.
    #[default]
    None,
    Memory,
    Sqlite,
    Firestore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub blank_title: BlankTitlePolicy,
    pub remote_failure: RemoteFailurePolicy,
    pub tags_enabled: bool,
    /// Labels offered by the tag picker; stored tags are not restricted to it.
    pub tag_labels: Vec<String>,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            blank_title: BlankTitlePolicy::default(),
            remote_failure: RemoteFailurePolicy::default(),
            tags_enabled: true,
            tag_labels: DEFAULT_TAG_LABELS
                .iter()
                .map(|label| label.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    /// Override for emulators; production uses the public endpoint.
    pub base_url: String,
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database: DEFAULT_FIRESTORE_DATABASE.to_string(),
            base_url: DEFAULT_FIRESTORE_BASE_URL.to_string(),
            api_key: None,
            bearer_token: None,
            timeout_secs: DEFAULT_FIRESTORE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,
    pub collection: String,
    pub sqlite_path: Option<PathBuf>,
    pub firestore: Option<FirestoreConfig>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: RemoteBackend::default(),
            collection: DEFAULT_COLLECTION.to_string(),
            sqlite_path: None,
            firestore: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Falls back to `default_log_level()` when unset.
    pub level: Option<String>,
    /// Absolute directory; logging stays off when unset.
    pub dir: Option<String>,
}

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoConfig {
    pub behavior: BehaviorConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

impl TodoConfig {
    /// Reads, parses and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let collection = self.remote.collection.trim();
        if collection.is_empty() || collection.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "remote.collection must be a single non-empty segment, got `{collection}`"
            )));
        }

        match self.remote.backend {
            RemoteBackend::Sqlite if self.remote.sqlite_path.is_none() => {
                return Err(ConfigError::Invalid(
                    "remote.sqlite_path is required for the sqlite backend".to_string(),
                ));
            }
            RemoteBackend::Firestore => {
                let firestore = self.remote.firestore.as_ref().ok_or_else(|| {
                    ConfigError::Invalid(
                        "[remote.firestore] is required for the firestore backend".to_string(),
                    )
                })?;
                if firestore.project_id.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "remote.firestore.project_id cannot be empty".to_string(),
                    ));
                }
                if firestore.timeout_secs == 0 {
                    return Err(ConfigError::Invalid(
                        "remote.firestore.timeout_secs must be positive".to_string(),
                    ));
                }
            }
            _ => {}
        }

        if self
            .behavior
            .tag_labels
            .iter()
            .any(|label| label.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "behavior.tag_labels cannot contain blank labels".to_string(),
            ));
        }

        Ok(())
    }
}
