// ABOUTME: Cluster identifiers parsed from sx://[profile@]host[/path] URIs.
// ABOUTME: Hosts and profiles double as directory names, so both are checked for path safety.

use crate::error::{ConfigError, Result};
use std::fmt;
use std::str::FromStr;

/// URI scheme prefix shared by cluster addresses, configuration links and aliases.
pub const SCHEME: &str = "sx://";

/// Profile name used when a URI carries none.
pub const DEFAULT_PROFILE: &str = "default";

/// A cluster host plus an optional profile.
///
/// `profile` is `None` for `sx://host` and for the empty `sx://@host` form;
/// both mean the `default` profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterIdentifier {
    pub host: String,
    pub profile: Option<String>,
}

impl ClusterIdentifier {
    /// Builds an identifier, rejecting hosts and profiles that are not usable as
    /// a single path component.
    pub fn new(host: impl Into<String>, profile: Option<String>) -> Result<Self> {
        let host = host.into();
        validate_component("host", &host)?;
        let profile = profile.filter(|p| !p.is_empty());
        if let Some(profile) = &profile {
            validate_component("profile", profile)?;
        }
        Ok(Self { host, profile })
    }

    /// The logical profile name, `default` when none was given.
    pub fn profile_name(&self) -> &str {
        self.profile.as_deref().unwrap_or(DEFAULT_PROFILE)
    }
}

impl fmt::Display for ClusterIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.profile_name() {
            DEFAULT_PROFILE => write!(f, "{SCHEME}{}", self.host),
            profile => write!(f, "{SCHEME}{profile}@{}", self.host),
        }
    }
}

impl FromStr for ClusterIdentifier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        parse_identifier(s)
    }
}

/// Parses `sx://[profile@]host[/path]`. Anything after the host is ignored.
pub fn parse_identifier(text: &str) -> Result<ClusterIdentifier> {
    let invalid = |reason| ConfigError::InvalidUri {
        uri: text.to_string(),
        reason,
    };

    let rest = text.strip_prefix(SCHEME).ok_or_else(|| invalid("missing sx:// scheme"))?;
    let authority = rest.split('/').next().unwrap_or_default();

    let (profile, host) = match authority.rsplit_once('@') {
        Some((profile, host)) => (Some(profile.to_string()), host),
        None => (None, authority),
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    ClusterIdentifier::new(host, profile)
}

/// Checks that `name` is a single, non-hidden path component.
pub fn validate_component(what: &'static str, name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(ConfigError::InvalidName {
            what,
            name: name.to_string(),
        });
    }
    Ok(())
}
