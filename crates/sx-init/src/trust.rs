// ABOUTME: Establishes whether and how the cluster is trusted before credentials are sent.
// ABOUTME: Plain HTTP clusters are probed for their security posture, TLS ones have their CA vetted.

use crate::error::{InitError, TokenError};
use crate::prompt::Prompter;
use colored::Colorize;
use sx_cluster::Cluster;
use sx_config::ClusterIdentifier;
use tracing::{debug, info};

/// Well-formed token that no cluster accepts.
///
/// Sent to learn the cluster UUID and posture: the reply headers arrive
/// even though authentication fails.
pub const PROBE_TOKEN: &str = "wFPs+e1B3wMRud8TzGw7YHjS08LWGuoIdfALMZTPLMVFKYM41rVlDwAA";

/// How trust should be settled for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustOptions<'a> {
    pub use_tls: bool,
    pub batch: bool,
    /// Fingerprint the certificate must match, from a configuration link
    pub ca_hint: Option<&'a str>,
}

/// Queries the cluster with the placeholder token so its reply headers get recorded.
///
/// An authentication failure is the expected outcome and counts as success.
pub fn probe<C: Cluster + ?Sized>(
    cluster: &mut C,
    identifier: &ClusterIdentifier,
) -> Result<(), InitError> {
    let profile = identifier.profile_name();
    cluster
        .add_credential(profile, PROBE_TOKEN)
        .and_then(|()| cluster.activate_credential(profile))
        .map_err(TokenError::Credential)?;

    match cluster.fetch_membership() {
        Ok(()) => Ok(()),
        Err(e) if e.is_auth() => {
            debug!(cluster = %identifier, "probe rejected as expected");
            Ok(())
        }
        Err(e) => Err(InitError::network("Failed to query cluster", e)),
    }
}

fn ask(prompter: &mut dyn Prompter, question: &str, default: bool) -> Result<bool, InitError> {
    prompter
        .confirm(question, default)
        .map_err(|e| InitError::trust(format!("Failed to read answer: {e}")))
}

/// Settles trust for `cluster`, prompting the operator unless in batch mode.
pub fn negotiate<C: Cluster + ?Sized>(
    cluster: &mut C,
    options: TrustOptions<'_>,
    identifier: &ClusterIdentifier,
    prompter: &mut dyn Prompter,
) -> Result<(), InitError> {
    if !options.use_tls {
        cluster.set_tls_material(None);
        if options.batch {
            return Ok(());
        }

        probe(cluster, identifier)?;
        if cluster.internally_secure() {
            eprintln!(
                "{} The cluster reports secure internal communication, however you're \
                 attempting to connect with SSL disabled.",
                "*** WARNING ***:".yellow().bold()
            );
            if !ask(prompter, "Do you want to continue?", false)? {
                return Err(InitError::trust("Aborted"));
            }
        }
        return Ok(());
    }

    let certificate = cluster.fetch_ca().map_err(|e| InitError::Trust {
        message: format!("Failed to fetch cluster CA: {e}"),
        source: Some(e),
    })?;
    let fingerprint = certificate.fingerprint();

    match options.ca_hint {
        Some(expected) => {
            if !certificate.matches_fingerprint(expected) {
                return Err(InitError::trust(format!(
                    "Certificate fingerprint {fingerprint} does not match the expected {expected}"
                )));
            }
            debug!(%fingerprint, "certificate matches pinned fingerprint");
        }
        None if options.batch => {
            info!(%fingerprint, "accepting cluster certificate in batch mode");
        }
        None => {
            eprintln!("Server certificate for {}:", identifier.host.bold());
            eprintln!("  SHA-256 fingerprint: {fingerprint}");
            if !ask(prompter, "Do you trust this SSL certificate?", true)? {
                return Err(InitError::trust("Aborted: certificate not trusted"));
            }
        }
    }

    cluster.set_tls_material(Some(&certificate));
    Ok(())
}
