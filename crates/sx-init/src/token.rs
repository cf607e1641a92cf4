// ABOUTME: Obtains the user token for the profile being configured.
// ABOUTME: Exactly one source applies per run; every token is validated the same way.

use crate::error::{InitError, TokenError};
use crate::link::STDIN_SOURCE;
use crate::prompt::{read_line_bounded, strip_newline, Prompter};
use crate::secret::SecretBuffer;
use crate::trust;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use sx_cluster::{is_valid_token, Cluster, ClusterError, AUTH_TOKEN_LEN};
use sx_config::ClusterIdentifier;
use tracing::debug;
use zeroize::Zeroizing;

/// Tokens starting with this identify a cluster, not a user.
pub const CLUSTER_TOKEN_PREFIX: &str = "CLUSTER/ALLNODE/ROOT/USER";

/// Where the token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Embedded in the configuration link
    Link,
    /// First line of a key file
    KeyFile(PathBuf),
    /// Typed in by the operator
    Interactive,
    /// Derived from a password, read from a file or prompted for
    Password { pass_file: Option<PathBuf> },
}

impl TokenSource {
    /// Picks the source from already validated flags.
    ///
    /// A link wins, then `--auth-file`, then `--key`, and a password otherwise.
    /// `--auth-file -` names no file, so it falls through like an absent flag.
    pub fn select(
        link_mode: bool,
        auth_file: Option<&str>,
        key: bool,
        pass_file: Option<&str>,
    ) -> Self {
        if link_mode {
            return TokenSource::Link;
        }
        match auth_file.filter(|path| *path != STDIN_SOURCE) {
            Some(path) => TokenSource::KeyFile(PathBuf::from(path)),
            None if key => TokenSource::Interactive,
            None => TokenSource::Password {
                pass_file: pass_file
                    .filter(|path| *path != STDIN_SOURCE)
                    .map(PathBuf::from),
            },
        }
    }
}

/// A validated user token, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(Zeroizing<String>);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Strips one trailing newline, then checks emptiness, the cluster
/// prefix and the token shape, in that order.
pub fn validate_token(raw: impl Into<String>) -> Result<Token, TokenError> {
    let mut raw = Zeroizing::new(raw.into());
    strip_newline(&mut raw);
    if raw.is_empty() {
        return Err(TokenError::Empty);
    }
    if raw.starts_with(CLUSTER_TOKEN_PREFIX) {
        return Err(TokenError::ClusterToken);
    }
    if !is_valid_token(&raw) {
        return Err(TokenError::Malformed);
    }
    Ok(Token(raw))
}

/// Produces the token for `identifier` from `source`.
///
/// `link_token` is the token carried by the configuration link, if any.
pub fn acquire<C: Cluster + ?Sized>(
    source: &TokenSource,
    link_token: Option<&str>,
    cluster: &mut C,
    identifier: &ClusterIdentifier,
    prompter: &mut dyn Prompter,
) -> Result<Token, InitError> {
    let raw = match source {
        TokenSource::Link => Zeroizing::new(link_token.unwrap_or_default().to_string()),
        TokenSource::KeyFile(path) => read_key_file(path)?,
        TokenSource::Interactive => Zeroizing::new(
            prompter
                .read_line("Please enter the user key: ", AUTH_TOKEN_LEN)
                .map_err(TokenError::Input)?
                .unwrap_or_default(),
        ),
        TokenSource::Password { pass_file } => {
            derive_from_password(cluster, identifier, pass_file.as_deref(), prompter)?
        }
    };
    debug!(source = ?source, "user key obtained");
    Ok(validate_token(raw.as_str())?)
}

fn read_key_file(path: &Path) -> Result<Zeroizing<String>, TokenError> {
    let mut file = File::open(path).map_err(|source| TokenError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    let line = read_line_bounded(&mut file, AUTH_TOKEN_LEN).map_err(TokenError::Input)?;
    Ok(Zeroizing::new(line.unwrap_or_default()))
}

fn derive_from_password<C: Cluster + ?Sized>(
    cluster: &mut C,
    identifier: &ClusterIdentifier,
    pass_file: Option<&Path>,
    prompter: &mut dyn Prompter,
) -> Result<Zeroizing<String>, InitError> {
    if cluster.uuid().is_none() {
        trust::probe(cluster, identifier)?;
        if cluster.uuid().is_none() {
            return Err(InitError::network(
                "Failed to obtain cluster UUID",
                ClusterError::MissingUuid,
            ));
        }
    }

    let mut password = SecretBuffer::new();
    match pass_file {
        Some(path) => {
            let mut file = File::open(path).map_err(|source| TokenError::PassFile {
                path: path.to_path_buf(),
                source,
            })?;
            let read = password
                .fill_line_from(&mut file)
                .map_err(TokenError::Input)?;
            if read == 0 {
                return Err(TokenError::EmptyPassFile(path.to_path_buf()).into());
            }
        }
        None => prompter
            .read_password(&format!("Enter password for {identifier}"), &mut password)
            .map_err(TokenError::Input)?,
    }

    let token = cluster
        .derive_token(identifier.profile_name(), password.as_bytes())
        .map_err(TokenError::Derivation)?;
    Ok(Zeroizing::new(token))
}
