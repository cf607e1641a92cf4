// ABOUTME: Error taxonomy for the provisioning workflow.
// ABOUTME: Each variant carries enough context (path, host, profile) to act on.

use std::path::PathBuf;
use sx_cluster::{ClusterError, AUTH_TOKEN_LEN};
use sx_config::ConfigError;
use thiserror::Error;

/// Failures while obtaining or validating a user token.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Failed to open key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open pass file {path}: {source}")]
    PassFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read pass file {0}")]
    EmptyPassFile(PathBuf),

    #[error("Failed to read input: {0}")]
    Input(#[source] std::io::Error),

    #[error("Failed to read user key")]
    Empty,

    #[error("The token provided is a cluster identificator and cannot be used for user authentication")]
    ClusterToken,

    #[error("Malformed user key: expected {} base64 characters", AUTH_TOKEN_LEN)]
    Malformed,

    #[error("Failed to get authentication token: {0}")]
    Derivation(#[source] ClusterError),

    #[error("Failed to set profile authentication: {0}")]
    Credential(#[source] ClusterError),
}

/// Errors raised by the sxinit workflows.
#[derive(Error, Debug)]
pub enum InitError {
    /// Bad combination of modes or flags, detected before any I/O.
    #[error("{0}")]
    Argument(String),

    /// Malformed cluster URI or configuration link.
    #[error("{message}")]
    Parse {
        message: String,
        #[source]
        source: Option<ConfigError>,
    },

    /// The local configuration root cannot be resolved or read.
    #[error("{context}: {source}")]
    ConfigDirectory {
        context: String,
        #[source]
        source: ConfigError,
    },

    #[error("No profiles configured")]
    NoProfiles { root: PathBuf },

    /// CA retrieval failed, or the operator declined to trust the cluster.
    #[error("{message}")]
    Trust {
        message: String,
        #[source]
        source: Option<ClusterError>,
    },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("{context}: {source}")]
    Network {
        context: String,
        #[source]
        source: ClusterError,
    },

    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: ConfigError,
    },

    #[error("Alias '{alias}' is already used")]
    AliasConflict { alias: String },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl InitError {
    pub fn parse(message: impl Into<String>) -> Self {
        InitError::Parse {
            message: message.into(),
            source: None,
        }
    }

    pub fn trust(message: impl Into<String>) -> Self {
        InitError::Trust {
            message: message.into(),
            source: None,
        }
    }

    pub fn network(context: impl Into<String>, source: ClusterError) -> Self {
        InitError::Network {
            context: context.into(),
            source,
        }
    }

    pub fn persistence(context: impl Into<String>, source: ConfigError) -> Self {
        InitError::Persistence {
            context: context.into(),
            source,
        }
    }

    pub fn config_directory(context: impl Into<String>, source: ConfigError) -> Self {
        InitError::ConfigDirectory {
            context: context.into(),
            source,
        }
    }

    fn cluster_error(&self) -> Option<&ClusterError> {
        match self {
            InitError::Network { source, .. } => Some(source),
            InitError::Trust { source, .. } => source.as_ref(),
            InitError::Token(TokenError::Derivation(source)) => Some(source),
            _ => None,
        }
    }

    /// Actionable advice for failures operators commonly hit.
    pub fn remediation(&self) -> Option<String> {
        match self.cluster_error()? {
            ClusterError::Resolve { host, .. } => Some(format!(
                "The name '{host}' could not be resolved. If the cluster has no DNS entry, \
                 point sxinit at its nodes directly, for example:\n  \
                 sxinit --host-list=IP1,IP2 sx://{host}"
            )),
            ClusterError::MissingUuid => Some(
                "Could not determine the cluster identity. Make sure the address points \
                 at an SX cluster and check the --port and --no-ssl settings."
                    .to_string(),
            ),
            _ => None,
        }
    }
}
