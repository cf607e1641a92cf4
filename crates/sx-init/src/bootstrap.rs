// ABOUTME: Drives a validated run mode: list, info, delete, or initialize a profile.
// ABOUTME: Nothing is written to the profile store until the cluster accepted the credentials.

use crate::error::{InitError, TokenError};
use crate::interrupt::{InterruptContext, WatchGuard};
use crate::link::parse_configuration_link;
use crate::options::{InitPlan, Mode, Target};
use crate::prompt::Prompter;
use crate::token;
use crate::trust::{self, TrustOptions};
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use sx_cluster::{CaCertificate, Cluster, Connector};
use sx_config::{parse_identifier, ClusterIdentifier, ClusterState, ConfigError, ProfileStore};
use tracing::{debug, info, warn};

/// Runs workflows against one profile store.
pub struct Bootstrap<C, P> {
    store: ProfileStore,
    connector: C,
    prompter: P,
    interrupt: Option<Arc<InterruptContext>>,
}

impl<C: Connector, P: Prompter> Bootstrap<C, P> {
    pub fn new(store: ProfileStore, connector: C, prompter: P) -> Self {
        Self {
            store,
            connector,
            prompter,
            interrupt: None,
        }
    }

    /// Lets `context` abort the cluster handle of a running workflow.
    pub fn with_interrupt(mut self, context: Arc<InterruptContext>) -> Self {
        self.interrupt = Some(context);
        self
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    /// Executes `mode`, writing listings and reports to `out`.
    pub fn run(&mut self, mode: &Mode, out: &mut dyn Write) -> Result<(), InitError> {
        match mode {
            Mode::List => self.list(out),
            Mode::Delete { address, alias } => {
                let identifier = self.resolve_address(address)?;
                self.check_alias(alias.as_deref(), &identifier)?;
                self.delete(&identifier, out)
            }
            Mode::Info {
                address,
                alias,
                force_reinit,
            } => {
                let identifier = self.resolve_address(address)?;
                self.check_alias(alias.as_deref(), &identifier)?;
                self.info(&identifier, *force_reinit, out)
            }
            Mode::Init(plan) => self.init(plan, out),
        }
    }

    /// Turns an address into an identifier, following an alias of that name if one exists.
    fn resolve_address(&self, address: &str) -> Result<ClusterIdentifier, InitError> {
        match self.store.aliases().resolve(address) {
            Ok(identifier) => {
                debug!(alias = address, target = %identifier, "address is an alias");
                return Ok(identifier);
            }
            Err(e) if e.is_not_configured() => {}
            Err(e) => warn!(error = %e, "ignoring unreadable alias index"),
        }
        parse_identifier(address).map_err(|e| InitError::Parse {
            message: format!("Invalid SX URI {address}"),
            source: Some(e),
        })
    }

    fn check_alias(
        &self,
        alias: Option<&str>,
        identifier: &ClusterIdentifier,
    ) -> Result<(), InitError> {
        let Some(alias) = alias else {
            return Ok(());
        };
        self.store
            .aliases()
            .check_alias(alias, identifier)
            .map_err(|e| match e {
                ConfigError::AliasConflict(alias) => InitError::AliasConflict { alias },
                ConfigError::BadAliasName(reason) => {
                    InitError::Argument(format!("Bad alias name: {reason}"))
                }
                e => InitError::config_directory("Failed to check alias", e),
            })
    }

    fn load(&self, host: &str) -> Result<Option<ClusterState>, InitError> {
        self.store
            .load(host)
            .map_err(|e| InitError::config_directory("Failed to load cluster configuration", e))
    }

    fn watch(&self, cluster: &C::Cluster) -> Option<WatchGuard> {
        self.interrupt
            .as_ref()
            .map(|context| context.watch(cluster.abort_handle()))
    }

    fn list(&mut self, out: &mut dyn Write) -> Result<(), InitError> {
        let profiles = self.store.enumerate().map_err(|e| match e {
            ConfigError::NoProfiles(root) => InitError::NoProfiles { root },
            e => InitError::config_directory("Failed to list profiles", e),
        })?;

        let mut shown = 0;
        for listing in profiles {
            let listing =
                listing.map_err(|e| InitError::config_directory("Failed to list profiles", e))?;
            let aliases = if listing.aliases.is_empty() {
                "-".to_string()
            } else {
                listing.aliases.join(" ")
            };
            writeln!(out, "{:<40} {}", listing.uri(), aliases)?;
            shown += 1;
        }

        if shown == 0 {
            return Err(InitError::NoProfiles {
                root: self.store.root().to_path_buf(),
            });
        }
        Ok(())
    }

    fn delete(
        &mut self,
        identifier: &ClusterIdentifier,
        out: &mut dyn Write,
    ) -> Result<(), InitError> {
        let outcome = self
            .store
            .delete_profile(identifier)
            .map_err(|e| InitError::persistence(format!("Failed to delete profile {identifier}"), e))?;
        info!(profile = %identifier, path = %outcome.profile_path.display(), "profile deleted");

        writeln!(out, "Profile {identifier} deleted")?;
        if outcome.cluster_removed {
            writeln!(
                out,
                "No profiles left, configuration of cluster {} removed",
                identifier.host
            )?;
        }
        Ok(())
    }

    fn info(
        &mut self,
        identifier: &ClusterIdentifier,
        force_reinit: bool,
        out: &mut dyn Write,
    ) -> Result<(), InitError> {
        let state = if force_reinit {
            None
        } else {
            self.load(&identifier.host)?
        };
        let state = state.ok_or_else(|| {
            InitError::config_directory(
                format!("Failed to load configuration for {identifier}"),
                ConfigError::ProfileNotConfigured {
                    profile: identifier.profile_name().to_string(),
                    host: identifier.host.clone(),
                },
            )
        })?;

        let profile = identifier.profile_name();
        let connection = &state.connection;
        let none = || "-".to_string();

        writeln!(out, "Cluster name: {}", state.name)?;
        writeln!(
            out,
            "Cluster UUID: {}",
            connection.uuid.clone().unwrap_or_else(none)
        )?;
        if let Some(dns) = &connection.dns_name {
            writeln!(out, "DNS name: {dns}")?;
        }
        let nodes = if connection.hosts.is_empty() {
            none()
        } else {
            connection.hosts.join(" ")
        };
        writeln!(out, "Nodes: {nodes}")?;
        let port = connection
            .port
            .unwrap_or(if connection.use_tls { 443 } else { 80 });
        writeln!(out, "Port: {port}")?;
        writeln!(out, "Use SSL: {}", if connection.use_tls { "yes" } else { "no" })?;
        if let Some(pem) = &state.ca_certificate {
            match CaCertificate::from_pem(pem) {
                Ok(certificate) => {
                    writeln!(out, "CA certificate fingerprint: {}", certificate.fingerprint())?
                }
                Err(e) => warn!(error = %e, "stored CA certificate is unreadable"),
            }
        }
        let status = if state.credentials.contains_key(profile) {
            "configured"
        } else {
            "not configured"
        };
        writeln!(out, "Profile: {profile} ({status})")?;
        writeln!(
            out,
            "Configuration directory: {}",
            self.store
                .cluster_dir(&identifier.host)
                .map_err(|e| InitError::config_directory("Failed to locate configuration", e))?
                .display()
        )?;

        let aliases = self
            .store
            .aliases()
            .list_aliases_for(profile, &identifier.host)
            .map_err(|e| InitError::config_directory("Failed to list aliases", e))?;
        let aliases = if aliases.is_empty() {
            none()
        } else {
            aliases.join(" ")
        };
        writeln!(out, "Aliases: {aliases}")?;
        Ok(())
    }

    fn init(&mut self, plan: &InitPlan, out: &mut dyn Write) -> Result<(), InitError> {
        let (identifier, link) = match &plan.target {
            Target::Address(address) => (self.resolve_address(address)?, None),
            Target::Link(source) => {
                let link = parse_configuration_link(source, &mut self.prompter)?;
                (link.identifier.clone(), Some(link))
            }
        };
        self.check_alias(plan.alias.as_deref(), &identifier)?;

        let host_list = link
            .as_ref()
            .map_or(plan.host_list.as_ref(), |l| l.host_list.as_ref());
        let use_tls = link.as_ref().map_or(plan.use_tls, |l| l.use_tls);
        let port = link.as_ref().map_or(plan.port, |l| l.port);

        let existing = if plan.force_reinit {
            None
        } else {
            self.load(&identifier.host)?
        };
        debug!(cluster = %identifier, existing = existing.is_some(), "initializing profile");
        let state = existing.unwrap_or_else(|| ClusterState::new(identifier.host.clone()));

        let mut cluster = self.connector.connect(state);
        let _watch = self.watch(&cluster);

        cluster.set_ssl_name(&identifier.host);
        match host_list {
            Some(hosts) => {
                cluster.set_dns_name(None);
                cluster.reset_hosts();
                for host in hosts {
                    cluster.add_host(host).map_err(|e| {
                        InitError::network(format!("Cannot add {host} to cluster nodes"), e)
                    })?;
                }
            }
            None => cluster.set_dns_name(Some(&identifier.host)),
        }
        if let Some(port) = port {
            cluster.set_port(port);
        }

        let trust_options = TrustOptions {
            use_tls,
            batch: plan.batch,
            ca_hint: link.as_ref().and_then(|l| l.ca_hint.as_deref()),
        };
        trust::negotiate(&mut cluster, trust_options, &identifier, &mut self.prompter)?;

        let token = token::acquire(
            &plan.token_source,
            link.as_ref().map(|l| l.token.as_str()),
            &mut cluster,
            &identifier,
            &mut self.prompter,
        )?;

        let profile = identifier.profile_name();
        cluster
            .add_credential(profile, token.as_str())
            .and_then(|()| cluster.activate_credential(profile))
            .map_err(TokenError::Credential)?;
        drop(token);

        cluster
            .fetch_membership()
            .map_err(|e| InitError::network("Failed to retrieve cluster members", e))?;

        // Saving replaces the cluster directory, dropping what a forced reinit discards
        self.store
            .save(cluster.state())
            .map_err(|e| InitError::persistence("Failed to save configuration", e))?;

        if let Some(alias) = &plan.alias {
            self.store
                .aliases()
                .bind(alias, profile, &identifier.host)
                .map_err(|e| InitError::persistence(format!("Failed to set alias {alias}"), e))?;
        }

        info!(cluster = %identifier, "profile configured");
        writeln!(out, "{} Profile {identifier} configured", "✓".green())?;
        Ok(())
    }
}
