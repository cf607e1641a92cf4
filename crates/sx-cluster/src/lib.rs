// ABOUTME: Cluster handle abstraction used by the sx provisioning tools.
// ABOUTME: The trait hides the transport so the bootstrap flow can run against test doubles.

pub mod error;
pub mod http;
mod tls;
pub mod token;

pub use error::{ClusterError, Result};
pub use http::{parse_cluster_header, ClusterHeader, HttpCluster, HttpConnector};
pub use token::{derive_token, is_valid_token, AUTH_TOKEN_BIN_LEN, AUTH_TOKEN_LEN};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sx_config::ClusterState;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Certificate presented by a cluster, kept as trust material once accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaCertificate {
    der: Vec<u8>,
}

impl CaCertificate {
    pub fn from_der(der: Vec<u8>) -> Self {
        Self { der }
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        let body: String = pem
            .lines()
            .map(str::trim)
            .skip_while(|line| *line != PEM_BEGIN)
            .skip(1)
            .take_while(|line| *line != PEM_END)
            .collect();
        if body.is_empty() {
            return Err(ClusterError::Certificate("no PEM certificate found".into()));
        }
        STANDARD
            .decode(body)
            .map(Self::from_der)
            .map_err(|e| ClusterError::Certificate(e.to_string()))
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> String {
        let encoded = STANDARD.encode(&self.der);
        let mut pem = format!("{PEM_BEGIN}\n");
        for line in encoded.as_bytes().chunks(64) {
            pem.push_str(&String::from_utf8_lossy(line));
            pem.push('\n');
        }
        pem.push_str(PEM_END);
        pem.push('\n');
        pem
    }

    /// Lowercase hex SHA-256 of the DER encoding.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }

    /// Compares against a fingerprint given by a user, ignoring case and `:` separators.
    pub fn matches_fingerprint(&self, expected: &str) -> bool {
        let expected: String = expected
            .chars()
            .filter(|c| *c != ':')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        expected == self.fingerprint()
    }
}

/// Lets another thread stop a handle's network activity.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A cluster being configured: connection parameters, credentials, and the
/// operations that reach out to the nodes.
///
/// Everything is in memory until the state is handed to the profile store.
pub trait Cluster {
    fn state(&self) -> &ClusterState;

    fn set_ssl_name(&mut self, name: &str);

    /// Sets the DNS name nodes are resolved from; `None` marks a DNS-less cluster.
    fn set_dns_name(&mut self, name: Option<&str>);

    fn reset_hosts(&mut self);

    fn add_host(&mut self, host: &str) -> Result<()>;

    fn set_port(&mut self, port: u16);

    /// Pins trust material; `None` switches the cluster to plain HTTP.
    fn set_tls_material(&mut self, certificate: Option<&CaCertificate>);

    fn add_credential(&mut self, profile: &str, token: &str) -> Result<()>;

    fn activate_credential(&mut self, profile: &str) -> Result<()>;

    /// Asks the cluster for its node list with the active credential.
    fn fetch_membership(&mut self) -> Result<()>;

    /// Retrieves the certificate the cluster presents, without trusting it yet.
    fn fetch_ca(&mut self) -> Result<CaCertificate>;

    /// Whether the last reply said nodes talk to each other over TLS.
    fn internally_secure(&self) -> bool;

    fn abort_handle(&self) -> AbortHandle;

    fn uuid(&self) -> Option<&str> {
        self.state().connection.uuid.as_deref()
    }

    fn derive_token(&self, profile: &str, password: &[u8]) -> Result<String> {
        let uuid = self.uuid().ok_or(ClusterError::MissingUuid)?;
        token::derive_token(uuid, profile, password)
    }
}

/// Creates cluster handles from persisted or fresh state.
pub trait Connector {
    type Cluster: Cluster;

    fn connect(&self, state: ClusterState) -> Self::Cluster;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pem_round_trip() {
        let cert = CaCertificate::from_der((0u8..=200).collect());
        let pem = cert.to_pem();
        assert!(pem.starts_with(PEM_BEGIN));
        assert!(pem.lines().all(|l| l.len() <= 64));
        assert_eq!(CaCertificate::from_pem(&pem).unwrap(), cert);
    }

    #[test]
    fn test_from_pem_rejects_garbage() {
        assert!(CaCertificate::from_pem("hello").is_err());
        assert!(CaCertificate::from_pem(&format!("{PEM_BEGIN}\n!!!\n{PEM_END}\n")).is_err());
    }

    #[test]
    fn test_fingerprint_matching() {
        let cert = CaCertificate::from_der(b"certificate".to_vec());
        let fp = cert.fingerprint();
        assert_eq!(fp.len(), 64);
        assert!(cert.matches_fingerprint(&fp));
        assert!(cert.matches_fingerprint(&fp.to_uppercase()));

        let with_colons: Vec<String> = fp
            .as_bytes()
            .chunks(2)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        assert!(cert.matches_fingerprint(&with_colons.join(":")));
        assert!(!cert.matches_fingerprint("00"));
    }

    #[test]
    fn test_abort_handle_is_shared() {
        let handle = AbortHandle::default();
        let clone = handle.clone();
        assert!(!handle.is_aborted());
        clone.abort();
        assert!(handle.is_aborted());
    }
}
