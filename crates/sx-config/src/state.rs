// ABOUTME: In-memory form of a configured cluster: connection parameters, trust material, credentials.
// ABOUTME: Connection parameters serialize to config.toml; the rest live in sibling files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Connection parameters persisted in `<root>/<host>/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Cluster UUID reported by the nodes
    pub uuid: Option<String>,
    /// Name the TLS certificate is expected to carry
    pub ssl_name: Option<String>,
    /// DNS name to resolve nodes from; `None` for DNS-less clusters
    pub dns_name: Option<String>,
    /// Known node addresses
    pub hosts: Vec<String>,
    /// Non-default HTTP(S) port
    pub port: Option<u16>,
    pub use_tls: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uuid: None,
            ssl_name: None,
            dns_name: None,
            hosts: Vec::new(),
            port: None,
            use_tls: true,
        }
    }
}

/// Everything known locally about one cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterState {
    /// Cluster name, the host part of its URI and its directory name
    pub name: String,
    pub connection: ConnectionConfig,
    /// PEM encoded certificate trusted for this cluster
    pub ca_certificate: Option<String>,
    /// Profile name to ASCII auth token
    pub credentials: BTreeMap<String, String>,
    /// Profile used for requests
    pub active_profile: Option<String>,
}

impl ClusterState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection: ConnectionConfig::default(),
            ca_certificate: None,
            credentials: BTreeMap::new(),
            active_profile: None,
        }
    }

    /// Token of the active profile, if one is set and known.
    pub fn active_token(&self) -> Option<&str> {
        self.active_profile
            .as_ref()
            .and_then(|p| self.credentials.get(p))
            .map(String::as_str)
    }
}

// Tokens never show up in logs.
impl fmt::Debug for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterState")
            .field("name", &self.name)
            .field("connection", &self.connection)
            .field("ca_certificate", &self.ca_certificate.is_some())
            .field("profiles", &self.credentials.keys().collect::<Vec<_>>())
            .field("active_profile", &self.active_profile)
            .finish()
    }
}
