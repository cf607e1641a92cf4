// ABOUTME: Error types for the profile store and alias registry using thiserror.
// ABOUTME: Every filesystem failure carries the path it happened on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while parsing cluster URIs or touching the configuration root.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The text is not a `sx://[profile@]host[/path]` URI.
    #[error("invalid SX URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: &'static str },

    /// A host or profile name cannot be used as a path component.
    #[error("invalid {what} name '{name}'")]
    InvalidName { what: &'static str, name: String },

    /// No explicit configuration root and no home directory to derive one from.
    #[error("cannot locate config directory: cannot determine home directory")]
    NoHomeDirectory,

    /// The configuration root does not exist yet.
    #[error("no profiles configured in {0}")]
    NoProfiles(PathBuf),

    #[error("cannot locate profile 'sx://{profile}@{host}/'")]
    ProfileNotConfigured { profile: String, host: String },

    #[error("alias '{0}' is not configured")]
    AliasNotConfigured(String),

    #[error("bad alias name: {0}")]
    BadAliasName(String),

    #[error("alias '{0}' is already used")]
    AliasConflict(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: toml::ser::Error,
    },
}

impl ConfigError {
    /// True for lookups that failed only because nothing was configured yet.
    pub fn is_not_configured(&self) -> bool {
        matches!(
            self,
            ConfigError::NoProfiles(_)
                | ConfigError::ProfileNotConfigured { .. }
                | ConfigError::AliasNotConfigured(_)
        )
    }
}

/// Result type alias using ConfigError.
pub type Result<T> = std::result::Result<T, ConfigError>;
