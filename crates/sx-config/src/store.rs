// ABOUTME: Filesystem-backed profile store: <root>/<host>/{config.toml,ca.pem,auth/<profile>}.
// ABOUTME: Atomic saves, profile deletion with directory cascade, and lazy enumeration.

use crate::alias::{AliasIndex, AliasRegistry};
use crate::error::{ConfigError, Result};
use crate::state::{ClusterState, ConnectionConfig};
use crate::uri::{validate_component, ClusterIdentifier, DEFAULT_PROFILE, SCHEME};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Directory under the home directory used when no root is given.
pub const DEFAULT_DIR_NAME: &str = ".sx";
pub const AUTH_DIR: &str = "auth";
pub const CONFIG_FILE: &str = "config.toml";
pub const CA_FILE: &str = "ca.pem";
pub const ALIAS_FILE: &str = ".aliases";

/// Default configuration root (~/.sx).
pub fn default_root() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_DIR_NAME))
        .ok_or(ConfigError::NoHomeDirectory)
}

/// What `delete_profile` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub profile_path: PathBuf,
    /// The deleted profile was the last one, so the cluster directory went too
    pub cluster_removed: bool,
}

/// The configuration root and everything under it.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens the explicit root if given, otherwise the default one.
    pub fn open(root: Option<&Path>) -> Result<Self> {
        match root {
            Some(root) => Ok(Self::new(root)),
            None => Ok(Self::new(default_root()?)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn aliases(&self) -> AliasRegistry {
        AliasRegistry::new(self.root.join(ALIAS_FILE))
    }

    pub fn cluster_dir(&self, host: &str) -> Result<PathBuf> {
        validate_component("host", host)?;
        Ok(self.root.join(host))
    }

    pub fn auth_dir(&self, host: &str) -> Result<PathBuf> {
        Ok(self.cluster_dir(host)?.join(AUTH_DIR))
    }

    /// `<root>/<host>/auth/<profile>`
    pub fn locate_profile_path(&self, host: &str, profile: &str) -> Result<PathBuf> {
        validate_component("profile", profile)?;
        Ok(self.auth_dir(host)?.join(profile))
    }

    pub fn exists(&self, host: &str, profile: &str) -> bool {
        self.locate_profile_path(host, profile)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Loads a saved cluster. `Ok(None)` means the cluster is not configured.
    pub fn load(&self, host: &str) -> Result<Option<ClusterState>> {
        let dir = self.cluster_dir(host)?;
        let config_path = dir.join(CONFIG_FILE);
        let Some(content) = read_optional(&config_path)? else {
            return Ok(None);
        };
        let connection: ConnectionConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: config_path.clone(),
                source: e,
            })?;

        let mut state = ClusterState::new(host);
        state.connection = connection;
        state.ca_certificate = read_optional(&dir.join(CA_FILE))?;

        let auth_dir = dir.join(AUTH_DIR);
        match fs::read_dir(&auth_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let profile = entry.file_name().to_string_lossy().into_owned();
                    if profile.starts_with('.') {
                        continue;
                    }
                    if !entry.path().is_file() {
                        debug!(host, entry = %profile, "skipping non-file in auth directory");
                        continue;
                    }
                    if let Some(token) = read_optional(&entry.path())? {
                        state
                            .credentials
                            .insert(profile, token.trim_end_matches(['\r', '\n']).to_string());
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::Read {
                    path: auth_dir,
                    source: e,
                })
            }
        }

        debug!(host, profiles = state.credentials.len(), "loaded cluster");
        Ok(Some(state))
    }

    /// Writes the cluster's connection parameters, trust material and every
    /// credential it holds, replacing whatever was saved for it before.
    ///
    /// The new directory is assembled in a hidden sibling and swapped in by
    /// rename, so any failure leaves the previous configuration in place.
    pub fn save(&self, state: &ClusterState) -> Result<()> {
        let dir = self.cluster_dir(&state.name)?;
        fs::create_dir_all(&self.root).map_err(|e| ConfigError::CreateDirectory {
            path: self.root.clone(),
            source: e,
        })?;

        let staging = self.hidden_dir(&state.name, "new")?;
        populate(staging.path(), state)?;
        self.swap_in(&state.name, staging, &dir)?;

        debug!(cluster = %state.name, path = %dir.display(), "saved cluster configuration");
        Ok(())
    }

    /// Empty directory under the root that enumeration does not see.
    fn hidden_dir(&self, host: &str, role: &str) -> Result<TempDir> {
        tempfile::Builder::new()
            .prefix(&format!(".{host}.{role}-"))
            .tempdir_in(&self.root)
            .map_err(|e| ConfigError::CreateDirectory {
                path: self.root.clone(),
                source: e,
            })
    }

    /// Moves the live directory aside, puts `staging` in its place, and puts
    /// the old one back if that fails.
    fn swap_in(&self, host: &str, staging: TempDir, dir: &Path) -> Result<()> {
        let backup = if dir.exists() {
            let holder = self.hidden_dir(host, "old")?;
            let old = holder.path().join(host);
            fs::rename(dir, &old).map_err(|e| ConfigError::Write {
                path: dir.to_path_buf(),
                source: e,
            })?;
            Some((holder, old))
        } else {
            None
        };

        if let Err(e) = fs::rename(staging.path(), dir) {
            if let Some((holder, old)) = backup {
                if let Err(restore) = fs::rename(&old, dir) {
                    let kept = holder.keep();
                    warn!(
                        path = %kept.display(),
                        error = %restore,
                        "previous configuration left aside"
                    );
                }
            }
            return Err(ConfigError::Write {
                path: dir.to_path_buf(),
                source: e,
            });
        }

        // Dropping the holder removes the previous configuration
        drop(backup);
        Ok(())
    }

    /// Removes the whole configuration of one cluster. Missing is fine.
    pub fn remove_cluster(&self, host: &str) -> Result<()> {
        let dir = self.cluster_dir(host)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::Remove {
                path: dir,
                source: e,
            }),
        }
    }

    /// Deletes one profile, its aliases, and the cluster directory if it was
    /// the last profile.
    pub fn delete_profile(&self, identifier: &ClusterIdentifier) -> Result<DeleteOutcome> {
        let profile = identifier.profile_name();
        let host = identifier.host.as_str();
        let path = self.locate_profile_path(host, profile)?;

        if !path.exists() {
            return Err(ConfigError::ProfileNotConfigured {
                profile: profile.to_string(),
                host: host.to_string(),
            });
        }

        fs::remove_file(&path).map_err(|e| ConfigError::Remove {
            path: path.clone(),
            source: e,
        })?;

        if let Err(e) = self.aliases().unbind_all(profile, host) {
            warn!(profile, host, error = %e, "failed to delete aliases for profile");
        }

        // rmdir only succeeds on an empty auth directory, i.e. no profile left
        let auth_dir = self.auth_dir(host)?;
        let cluster_removed = match fs::remove_dir(&auth_dir) {
            Ok(()) => {
                let cluster_dir = self.cluster_dir(host)?;
                fs::remove_dir_all(&cluster_dir).map_err(|e| ConfigError::Remove {
                    path: cluster_dir,
                    source: e,
                })?;
                true
            }
            Err(e) => {
                debug!(host, error = %e, "other profiles remain");
                false
            }
        };

        Ok(DeleteOutcome {
            profile_path: path,
            cluster_removed,
        })
    }

    /// Starts a fresh walk over every configured profile.
    pub fn enumerate(&self) -> Result<Profiles> {
        let clusters = match fs::read_dir(&self.root) {
            Ok(clusters) => clusters,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::NoProfiles(self.root.clone()))
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: self.root.clone(),
                    source: e,
                })
            }
        };

        Ok(Profiles {
            root: self.root.clone(),
            aliases: self.aliases().load()?,
            clusters,
            current: None,
        })
    }
}

/// One configured profile as seen by `ProfileStore::enumerate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileListing {
    pub host: String,
    pub profile: String,
    pub aliases: Vec<String>,
}

impl ProfileListing {
    /// `sx://host` for the default profile, `sx://profile@host` otherwise.
    pub fn uri(&self) -> String {
        if self.profile == DEFAULT_PROFILE {
            format!("{SCHEME}{}", self.host)
        } else {
            format!("{SCHEME}{}@{}", self.profile, self.host)
        }
    }
}

/// Lazy iterator over `<root>/*/auth/*`, skipping hidden entries and anything
/// that is not a file.
///
/// Directories that disappear while the walk is running are skipped.
pub struct Profiles {
    root: PathBuf,
    aliases: AliasIndex,
    clusters: fs::ReadDir,
    current: Option<(String, fs::ReadDir)>,
}

impl Profiles {
    fn next_in_current(&mut self) -> Option<ProfileListing> {
        let (host, profiles) = self.current.as_mut()?;
        for entry in profiles.by_ref() {
            let Ok(entry) = entry else {
                break;
            };
            let profile = entry.file_name().to_string_lossy().into_owned();
            if profile.starts_with('.') || !entry.path().is_file() {
                continue;
            }
            let aliases = self.aliases.aliases_for(&profile, host);
            return Some(ProfileListing {
                host: host.clone(),
                profile,
                aliases,
            });
        }
        self.current = None;
        None
    }
}

impl Iterator for Profiles {
    type Item = Result<ProfileListing>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(listing) = self.next_in_current() {
                return Some(Ok(listing));
            }

            let entry = match self.clusters.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(ConfigError::Read {
                        path: self.root.clone(),
                        source: e,
                    }))
                }
            };

            let host = entry.file_name().to_string_lossy().into_owned();
            if host.starts_with('.') {
                continue;
            }

            match fs::read_dir(entry.path().join(AUTH_DIR)) {
                Ok(profiles) => self.current = Some((host, profiles)),
                Err(e) => debug!(host, error = %e, "skipping cluster without auth directory"),
            }
        }
    }
}

/// Writes a complete cluster directory into `dir`, which is empty.
fn populate(dir: &Path, state: &ClusterState) -> Result<()> {
    let auth_dir = dir.join(AUTH_DIR);
    create_private_dir(&auth_dir)?;

    if let Some(pem) = &state.ca_certificate {
        write_atomic(&dir.join(CA_FILE), pem.as_bytes())?;
    }

    let config = toml::to_string_pretty(&state.connection).map_err(|e| ConfigError::Serialize {
        what: "cluster configuration",
        source: e,
    })?;
    write_atomic(&dir.join(CONFIG_FILE), config.as_bytes())?;

    for (profile, token) in &state.credentials {
        validate_component("profile", profile)?;
        write_atomic(&auth_dir.join(profile), format!("{token}\n").as_bytes())?;
    }
    Ok(())
}

/// Replaces `path` with `contents` through a temp file in the same directory.
///
/// The temp file is created 0600 on Unix, which the renamed file keeps.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDirectory {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn create_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| ConfigError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })?;

    // Set restrictive permissions on Unix (0700 = rwx------)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| {
            ConfigError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
    }

    Ok(())
}
