// ABOUTME: Alias registry mapping human-chosen sx:// names to a (profile, host) pair.
// ABOUTME: Backed by a TOML index file in the configuration root, rewritten atomically.

use crate::error::{ConfigError, Result};
use crate::store::write_atomic;
use crate::uri::{ClusterIdentifier, DEFAULT_PROFILE, SCHEME};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Target of one alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTarget {
    pub profile: String,
    pub host: String,
}

/// Contents of the alias index file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasIndex {
    #[serde(default)]
    pub aliases: BTreeMap<String, AliasTarget>,
}

impl AliasIndex {
    /// Alias names bound to `(profile, host)`, sorted.
    pub fn aliases_for(&self, profile: &str, host: &str) -> Vec<String> {
        self.aliases
            .iter()
            .filter(|(_, t)| t.profile == profile && t.host == host)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Handle on the alias index file of one configuration root.
#[derive(Debug, Clone)]
pub struct AliasRegistry {
    path: PathBuf,
}

impl AliasRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the index; a missing file is an empty index.
    pub fn load(&self) -> Result<AliasIndex> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AliasIndex::default()),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    fn store(&self, index: &AliasIndex) -> Result<()> {
        let content = toml::to_string_pretty(index).map_err(|e| ConfigError::Serialize {
            what: "alias index",
            source: e,
        })?;
        write_atomic(&self.path, content.as_bytes())
    }

    /// Looks an alias up and returns the identifier it stands for.
    ///
    /// A binding to the `default` profile resolves to an identifier without a
    /// profile, matching the canonical `sx://host` form.
    pub fn resolve(&self, alias: &str) -> Result<ClusterIdentifier> {
        let index = self.load()?;
        let target = index
            .aliases
            .get(alias)
            .ok_or_else(|| ConfigError::AliasNotConfigured(alias.to_string()))?;
        let profile = (target.profile != DEFAULT_PROFILE).then(|| target.profile.clone());
        ClusterIdentifier::new(target.host.clone(), profile)
    }

    /// Verifies `alias` can be bound to `identifier` without clobbering another binding.
    ///
    /// Hosts must match exactly. Profiles match when both are absent or both
    /// present and equal; one present and one absent is a conflict.
    pub fn check_alias(&self, alias: &str, identifier: &ClusterIdentifier) -> Result<()> {
        validate_alias_name(alias)?;

        let existing = match self.resolve(alias) {
            Ok(existing) => existing,
            Err(e) if e.is_not_configured() => return Ok(()),
            Err(e) => return Err(e),
        };

        if existing.host != identifier.host {
            return Err(ConfigError::AliasConflict(alias.to_string()));
        }

        match (&existing.profile, &identifier.profile) {
            (None, None) => Ok(()),
            (Some(a), Some(b)) if a == b => Ok(()),
            _ => Err(ConfigError::AliasConflict(alias.to_string())),
        }
    }

    /// Records `alias` as pointing to `(profile, host)`.
    pub fn bind(&self, alias: &str, profile: &str, host: &str) -> Result<()> {
        validate_alias_name(alias)?;
        let mut index = self.load()?;
        index.aliases.insert(
            alias.to_string(),
            AliasTarget {
                profile: profile.to_string(),
                host: host.to_string(),
            },
        );
        debug!(alias, profile, host, "binding alias");
        self.store(&index)
    }

    /// Removes every alias bound to `(profile, host)` and returns how many went.
    pub fn unbind_all(&self, profile: &str, host: &str) -> Result<usize> {
        let mut index = self.load()?;
        let before = index.aliases.len();
        index
            .aliases
            .retain(|_, t| !(t.profile == profile && t.host == host));
        let removed = before - index.aliases.len();
        if removed > 0 {
            debug!(profile, host, removed, "removing aliases");
            self.store(&index)?;
        }
        Ok(removed)
    }

    pub fn list_aliases_for(&self, profile: &str, host: &str) -> Result<Vec<String>> {
        Ok(self.load()?.aliases_for(profile, host))
    }
}

/// Alias names must start with `sx://` and have something after it.
pub fn validate_alias_name(alias: &str) -> Result<()> {
    if !alias.starts_with(SCHEME) {
        return Err(ConfigError::BadAliasName(format!(
            "it must start with {SCHEME}"
        )));
    }
    if alias.len() <= SCHEME.len() {
        return Err(ConfigError::BadAliasName(
            "alias name is too short".to_string(),
        ));
    }
    Ok(())
}
