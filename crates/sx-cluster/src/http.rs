// ABOUTME: HTTP(S) cluster handle built on reqwest's blocking client.
// ABOUTME: Node list queries, certificate capture and SX-Cluster header parsing.

use crate::error::{ClusterError, Result};
use crate::tls::{self, CaptureVerifier, PinnedVerifier};
use crate::token::is_valid_token;
use crate::{AbortHandle, CaCertificate, Cluster, Connector};
use reqwest::blocking::{Client, Response};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use rustls::client::danger::ServerCertVerifier;
use serde::Deserialize;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use sx_config::ClusterState;
use tracing::debug;

/// Response header carrying `<version> (<uuid>)[ ssl]`.
pub const CLUSTER_HEADER: &str = "SX-Cluster";

const NODE_LIST_QUERY: &str = "/?nodeList";
const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_HTTPS_PORT: u16 = 443;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Substrings the resolver puts into its errors when a name does not exist.
const RESOLVE_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "Name or service not known",
    "No such host",
];

/// Parsed `SX-Cluster` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHeader {
    pub version: String,
    pub uuid: Option<String>,
    /// Nodes talk to each other over TLS
    pub secure: bool,
}

pub fn parse_cluster_header(value: &str) -> Option<ClusterHeader> {
    let value = value.trim();
    let (version, rest) = value.split_once(' ').unwrap_or((value, ""));
    if version.is_empty() {
        return None;
    }

    let rest = rest.trim();
    let (uuid, tail) = match rest.strip_prefix('(') {
        Some(inner) => {
            let (uuid, tail) = inner.split_once(')')?;
            let uuid = uuid.trim();
            ((!uuid.is_empty()).then(|| uuid.to_string()), tail)
        }
        None => (None, rest),
    };

    Some(ClusterHeader {
        version: version.to_string(),
        uuid,
        secure: tail.trim() == "ssl",
    })
}

#[derive(Deserialize)]
struct NodeList {
    #[serde(rename = "nodeList")]
    node_list: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Plain,
    /// TLS checked against the pinned certificate
    Verified,
    /// TLS accepting any certificate, to capture it
    Capture,
}

/// Cluster handle speaking HTTP(S) to the nodes.
pub struct HttpCluster {
    state: ClusterState,
    internally_secure: bool,
    abort: AbortHandle,
}

impl HttpCluster {
    pub fn new(state: ClusterState) -> Self {
        Self {
            state,
            internally_secure: false,
            abort: AbortHandle::default(),
        }
    }

    fn transport(&self) -> Transport {
        if self.state.connection.use_tls {
            Transport::Verified
        } else {
            Transport::Plain
        }
    }

    fn port(&self, transport: Transport) -> u16 {
        self.state.connection.port.unwrap_or(match transport {
            Transport::Plain => DEFAULT_HTTP_PORT,
            Transport::Verified | Transport::Capture => DEFAULT_HTTPS_PORT,
        })
    }

    fn targets(&self) -> Result<Vec<String>> {
        let connection = &self.state.connection;
        if let Some(dns_name) = &connection.dns_name {
            return Ok(vec![dns_name.clone()]);
        }
        if connection.hosts.is_empty() {
            return Err(ClusterError::NoNodes);
        }
        Ok(connection.hosts.clone())
    }

    /// Certificate check for the TLS transports, `None` for plain HTTP.
    fn verifier(
        &self,
        transport: Transport,
        capture: Option<&Arc<CaptureVerifier>>,
    ) -> Result<Option<Arc<dyn ServerCertVerifier>>> {
        let verifier: Arc<dyn ServerCertVerifier> = match transport {
            Transport::Plain => return Ok(None),
            Transport::Capture => match capture {
                Some(capture) => capture.clone(),
                None => Arc::new(CaptureVerifier::new(tls::provider())),
            },
            Transport::Verified => {
                let pem = self.state.ca_certificate.as_deref().ok_or_else(|| {
                    ClusterError::Certificate("no trusted certificate configured".into())
                })?;
                let pinned = CaCertificate::from_pem(pem)?;
                Arc::new(PinnedVerifier::new(pinned.der().to_vec(), tls::provider()))
            }
        };
        Ok(Some(verifier))
    }

    fn client_for(
        &self,
        target: &str,
        transport: Transport,
        capture: Option<&Arc<CaptureVerifier>>,
    ) -> Result<(Client, String)> {
        let port = self.port(transport);
        let mut url_host = target.to_string();
        let mut builder = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(verifier) = self.verifier(transport, capture)? {
            let config = tls::client_config(verifier, tls::provider())?;
            builder = builder.use_preconfigured_tls(config);

            // Nodes reached by address still have to present the cluster name
            if let (Some(name), Ok(ip)) = (
                self.state.connection.ssl_name.as_deref(),
                target.parse::<IpAddr>(),
            ) {
                builder = builder.resolve(name, SocketAddr::new(ip, port));
                url_host = name.to_string();
            }
        }

        let client = builder.build().map_err(|e| ClusterError::Transport {
            host: target.to_string(),
            source: e,
        })?;

        let scheme = match transport {
            Transport::Plain => "http",
            Transport::Verified | Transport::Capture => "https",
        };
        let url = format!("{scheme}://{}:{port}{NODE_LIST_QUERY}", url_host_part(&url_host));
        Ok((client, url))
    }

    /// Sends the node list query to each known node until one answers.
    fn query(
        &self,
        transport: Transport,
        token: Option<&str>,
        capture: Option<&Arc<CaptureVerifier>>,
    ) -> Result<Response> {
        let mut last_error = ClusterError::NoNodes;

        for target in self.targets()? {
            if self.abort.is_aborted() {
                return Err(ClusterError::Aborted);
            }

            let (client, url) = self.client_for(&target, transport, capture)?;
            let mut request = client.get(&url);
            if let Some(token) = token {
                request = request.header(AUTHORIZATION, format!("SKY {token}"));
            }

            debug!(%url, "querying cluster node");
            match request.send() {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let err = classify(&target, e);
                    debug!(error = %err, "node did not answer");
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    /// Records the UUID and security flag from a reply.
    fn absorb_header(&mut self, host: &str, response: &Response) -> Result<()> {
        let header = response
            .headers()
            .get(CLUSTER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_cluster_header)
            .ok_or_else(|| ClusterError::Protocol {
                host: host.to_string(),
                message: format!("missing {CLUSTER_HEADER} header, not an SX cluster"),
            })?;

        debug!(version = %header.version, uuid = ?header.uuid, secure = header.secure, "cluster header");
        self.internally_secure = header.secure;

        match (&self.state.connection.uuid, header.uuid) {
            (Some(known), Some(seen)) if *known != seen => Err(ClusterError::Protocol {
                host: host.to_string(),
                message: format!("cluster UUID changed from {known} to {seen}"),
            }),
            (None, Some(seen)) => {
                self.state.connection.uuid = Some(seen);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Cluster for HttpCluster {
    fn state(&self) -> &ClusterState {
        &self.state
    }

    fn set_ssl_name(&mut self, name: &str) {
        self.state.connection.ssl_name = Some(name.to_string());
    }

    fn set_dns_name(&mut self, name: Option<&str>) {
        self.state.connection.dns_name = name.map(String::from);
    }

    fn reset_hosts(&mut self) {
        self.state.connection.hosts.clear();
    }

    fn add_host(&mut self, host: &str) -> Result<()> {
        if host.is_empty() || host.contains(char::is_whitespace) || host.contains('/') {
            return Err(ClusterError::InvalidHost(host.to_string()));
        }
        self.state.connection.hosts.push(host.to_string());
        Ok(())
    }

    fn set_port(&mut self, port: u16) {
        self.state.connection.port = Some(port);
    }

    fn set_tls_material(&mut self, certificate: Option<&CaCertificate>) {
        self.state.connection.use_tls = certificate.is_some();
        self.state.ca_certificate = certificate.map(CaCertificate::to_pem);
    }

    fn add_credential(&mut self, profile: &str, token: &str) -> Result<()> {
        if !is_valid_token(token) {
            return Err(ClusterError::InvalidToken("malformed token"));
        }
        self.state
            .credentials
            .insert(profile.to_string(), token.to_string());
        Ok(())
    }

    fn activate_credential(&mut self, profile: &str) -> Result<()> {
        if !self.state.credentials.contains_key(profile) {
            return Err(ClusterError::InvalidToken("no credential for this profile"));
        }
        self.state.active_profile = Some(profile.to_string());
        Ok(())
    }

    fn fetch_membership(&mut self) -> Result<()> {
        let token = self
            .state
            .active_token()
            .ok_or(ClusterError::InvalidToken("no active credential"))?
            .to_string();

        let response = self.query(self.transport(), Some(&token), None)?;
        let host = response.url().host_str().unwrap_or_default().to_string();
        self.absorb_header(&host, &response)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClusterError::Auth(format!("{host} replied {status}")));
        }
        if !status.is_success() {
            return Err(ClusterError::Protocol {
                host,
                message: format!("HTTP {status}"),
            });
        }

        let body = response.text().map_err(|e| classify(&host, e))?;
        let nodes: NodeList = serde_json::from_str(&body).map_err(|e| ClusterError::Protocol {
            host: host.clone(),
            message: format!("bad node list: {e}"),
        })?;
        if nodes.node_list.is_empty() {
            return Err(ClusterError::Protocol {
                host,
                message: "empty node list".to_string(),
            });
        }

        debug!(nodes = nodes.node_list.len(), "fetched cluster members");
        self.state.connection.hosts = nodes.node_list;
        Ok(())
    }

    fn fetch_ca(&mut self) -> Result<CaCertificate> {
        let capture = Arc::new(CaptureVerifier::new(tls::provider()));
        let response = self.query(Transport::Capture, None, Some(&capture))?;
        let host = response.url().host_str().unwrap_or_default().to_string();
        self.absorb_header(&host, &response)?;

        // Pin the top of the presented chain so nodes issued by a cluster CA verify later
        let der = capture
            .anchor()
            .ok_or_else(|| ClusterError::Certificate(format!("{host} presented no certificate")))?;
        Ok(CaCertificate::from_der(der))
    }

    fn internally_secure(&self) -> bool {
        self.internally_secure
    }

    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

/// Opens `HttpCluster` handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    type Cluster = HttpCluster;

    fn connect(&self, state: ClusterState) -> HttpCluster {
        HttpCluster::new(state)
    }
}

fn url_host_part(host: &str) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

fn is_resolve_failure(error: &reqwest::Error) -> bool {
    let mut cause: Option<&dyn std::error::Error> = Some(error);
    while let Some(err) = cause {
        let text = err.to_string();
        if RESOLVE_MARKERS.iter().any(|marker| text.contains(marker)) {
            return true;
        }
        cause = err.source();
    }
    false
}

fn classify(host: &str, source: reqwest::Error) -> ClusterError {
    if is_resolve_failure(&source) {
        ClusterError::Resolve {
            host: host.to_string(),
            source,
        }
    } else {
        ClusterError::Transport {
            host: host.to_string(),
            source,
        }
    }
}
