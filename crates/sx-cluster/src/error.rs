// ABOUTME: Error types for cluster handle operations using thiserror.
// ABOUTME: Authentication failures are a distinct variant so probes can expect them.

use thiserror::Error;

/// Errors that can occur while talking to a cluster or preparing a handle.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The cluster rejected the credential. Expected during unauthenticated probes.
    #[error("invalid credentials: {0}")]
    Auth(String),

    /// The node name could not be resolved.
    #[error("cannot resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to contact {host}: {source}")]
    Transport {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected reply from {host}: {message}")]
    Protocol { host: String, message: String },

    #[error("unable to determine cluster identity (UUID)")]
    MissingUuid,

    #[error("no cluster nodes configured")]
    NoNodes,

    #[error("invalid host '{0}'")]
    InvalidHost(String),

    #[error("invalid user key: {0}")]
    InvalidToken(&'static str),

    #[error("invalid certificate: {0}")]
    Certificate(String),

    #[error("operation aborted")]
    Aborted,
}

impl ClusterError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ClusterError::Auth(_))
    }
}

/// Result type alias using ClusterError.
pub type Result<T> = std::result::Result<T, ClusterError>;
