// ABOUTME: Command-line choices and their validation into one run mode.
// ABOUTME: Validation is pure, so every flag conflict surfaces before any file or network access.

use crate::error::InitError;
use crate::link::split_host_list;
use crate::token::TokenSource;
use std::path::PathBuf;
use tracing::warn;

/// Raw options as given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Positional cluster addresses; exactly one is needed outside list and link modes
    pub addresses: Vec<String>,
    pub list: bool,
    pub config_link: Option<String>,
    pub config_dir: Option<PathBuf>,
    pub host_list: Option<String>,
    pub no_ssl: bool,
    /// Kept signed so that zero and negative values are reported, not wrapped
    pub port: Option<i64>,
    pub alias: Option<String>,
    pub delete: bool,
    pub info: bool,
    pub force_reinit: bool,
    pub auth_file: Option<String>,
    pub key: bool,
    pub pass_file: Option<String>,
    pub batch: bool,
}

/// Where the cluster to work on comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `sx://[profile@]cluster` or an alias name
    Address(String),
    /// Configuration link source: inline, a file, or `-` for stdin
    Link(String),
}

/// Parameters of a profile initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPlan {
    pub target: Target,
    pub host_list: Option<Vec<String>>,
    pub use_tls: bool,
    pub port: Option<u16>,
    pub alias: Option<String>,
    pub force_reinit: bool,
    pub batch: bool,
    pub token_source: TokenSource,
}

/// What a run does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    List,
    Delete { address: String, alias: Option<String> },
    Info {
        address: String,
        alias: Option<String>,
        force_reinit: bool,
    },
    Init(InitPlan),
}

fn argument(message: impl Into<String>) -> InitError {
    InitError::Argument(message.into())
}

impl InitOptions {
    /// Checks the flag combination and settles the run mode.
    pub fn validate(&self) -> Result<Mode, InitError> {
        let link = self.config_link.is_some();
        let inputs = self.addresses.len();

        if (inputs != 1 && !self.list && !link) || (inputs != 0 && (self.list || link)) {
            return Err(argument("Wrong number of arguments"));
        }
        if self.pass_file.is_some() && (link || self.auth_file.is_some()) {
            return Err(argument("Wrong number of arguments"));
        }
        if link && (self.list || self.delete || self.info || self.auth_file.is_some()) {
            return Err(argument("Wrong number of arguments"));
        }
        if self.delete && self.info {
            return Err(argument("--delete and --info cannot be used together"));
        }

        if self.list {
            return Ok(Mode::List);
        }

        let port = match self.port {
            None => None,
            Some(port) => match u16::try_from(port) {
                Ok(port) if port > 0 => Some(port),
                _ => return Err(argument(format!("Invalid port given: {port}"))),
            },
        };

        let host_list = self
            .host_list
            .as_deref()
            .map(|list| split_host_list(list).map_err(argument))
            .transpose()?;

        if let Some(source) = &self.config_link {
            if host_list.is_some() || self.no_ssl || port.is_some() {
                warn!("connection flags are ignored when a configuration link is used");
            }
            return Ok(Mode::Init(InitPlan {
                target: Target::Link(source.clone()),
                host_list: None,
                use_tls: true,
                port: None,
                alias: self.alias.clone(),
                force_reinit: self.force_reinit,
                batch: self.batch,
                token_source: TokenSource::Link,
            }));
        }

        let address = self.addresses[0].clone();
        if self.delete {
            return Ok(Mode::Delete {
                address,
                alias: self.alias.clone(),
            });
        }
        if self.info {
            return Ok(Mode::Info {
                address,
                alias: self.alias.clone(),
                force_reinit: self.force_reinit,
            });
        }

        Ok(Mode::Init(InitPlan {
            target: Target::Address(address),
            host_list,
            use_tls: !self.no_ssl,
            port,
            alias: self.alias.clone(),
            force_reinit: self.force_reinit,
            batch: self.batch,
            token_source: TokenSource::select(
                false,
                self.auth_file.as_deref(),
                self.key,
                self.pass_file.as_deref(),
            ),
        }))
    }
}
