// ABOUTME: Configuration links: an sx:// URI carrying a token and connection hints in its query.
// ABOUTME: Links come inline, from a file or from stdin, and also define host-list syntax.

use crate::error::InitError;
use crate::prompt::{read_line_bounded, strip_newline, Prompter};
use std::fmt;
use std::fs::File;
use sx_config::{parse_identifier, ClusterIdentifier, SCHEME};
use tracing::debug;

/// Source value meaning "read it from standard input".
pub const STDIN_SOURCE: &str = "-";

/// Longest link line accepted from a file or stdin.
pub const LINK_LINE_LIMIT: usize = 1023;

/// Everything a configuration link describes.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigurationLink {
    pub identifier: ClusterIdentifier,
    pub token: String,
    pub host_list: Option<Vec<String>>,
    pub use_tls: bool,
    pub port: Option<u16>,
    /// SHA-256 fingerprint the cluster certificate must match
    pub ca_hint: Option<String>,
}

impl fmt::Debug for ConfigurationLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationLink")
            .field("identifier", &self.identifier)
            .field("host_list", &self.host_list)
            .field("use_tls", &self.use_tls)
            .field("port", &self.port)
            .field("ca_hint", &self.ca_hint)
            .finish_non_exhaustive()
    }
}

fn link_error(reason: &str) -> InitError {
    InitError::parse(format!("Failed to parse configuration link: {reason}"))
}

/// Reads a link from `source` and parses it.
///
/// A source starting with `sx://` is the link itself, `-` reads one line
/// from stdin, anything else names a file whose first line is the link.
pub fn parse_configuration_link(
    source: &str,
    prompter: &mut dyn Prompter,
) -> Result<ConfigurationLink, InitError> {
    if source.starts_with(SCHEME) {
        return parse_link_text(source);
    }

    let line = if source == STDIN_SOURCE {
        prompter
            .read_line("Please enter the configuration link: ", LINK_LINE_LIMIT)
            .map_err(|e| link_error(&format!("Failed to read input: {e}")))?
    } else {
        let mut file = File::open(source).map_err(|e| {
            debug!(path = source, error = %e, "cannot open link file");
            InitError::parse(format!(
                "Failed to open configuration link: Failed to open file {source}"
            ))
        })?;
        read_line_bounded(&mut file, LINK_LINE_LIMIT)
            .map_err(|e| link_error(&format!("Failed to read file: {e}")))?
    };

    let mut line = line.ok_or_else(|| link_error("Failed to read file"))?;
    strip_newline(&mut line);
    parse_link_text(&line)
}

/// Parses `sx://[profile@]cluster?token=...&ip=...&ssl=y|n&port=N&fp=...`.
///
/// Unknown keys are ignored. Values are taken verbatim, so base64 tokens
/// keep their `+` and `/` characters.
pub fn parse_link_text(text: &str) -> Result<ConfigurationLink, InitError> {
    let (uri, query) = text
        .split_once('?')
        .ok_or_else(|| link_error("Missing token parameter"))?;

    let identifier = parse_identifier(uri).map_err(|e| InitError::Parse {
        message: "Failed to parse configuration link: Invalid configuration URI".into(),
        source: Some(e),
    })?;

    let mut token = None;
    let mut host_list = None;
    let mut ssl = None;
    let mut port = None;
    let mut ca_hint = None;

    for pair in query.split('&') {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| link_error("Invalid configuration URI"))?;
        match key {
            "token" => token = Some(value),
            "ip" => host_list = Some(value),
            "ssl" => ssl = Some(value),
            "port" => port = Some(value),
            "fp" => ca_hint = Some(value),
            _ => debug!(key, "ignoring unknown configuration link parameter"),
        }
    }

    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| link_error("Missing token"))?;

    let use_tls = match ssl {
        None | Some("y") => true,
        Some("n") if ca_hint.is_none() => false,
        Some(_) => return Err(link_error("Invalid configuration URI")),
    };

    let port = port
        .map(|p| parse_port(p).ok_or_else(|| link_error("Invalid port number")))
        .transpose()?;

    let host_list = host_list
        .map(|list| split_host_list(list).map_err(link_error))
        .transpose()?;

    Ok(ConfigurationLink {
        identifier,
        token: token.to_string(),
        host_list,
        use_tls,
        port,
        ca_hint: ca_hint.filter(|fp| !fp.is_empty()).map(String::from),
    })
}

/// Decimal digits only, in 1..=65535.
pub fn parse_port(text: &str) -> Option<u16> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u16>().ok().filter(|p| *p != 0)
}

/// Splits a comma separated node list, keeping order. Empty entries are errors.
pub fn split_host_list(list: &str) -> Result<Vec<String>, &'static str> {
    list.split(',')
        .map(|host| {
            if host.is_empty() {
                Err("Invalid host list: empty host name")
            } else {
                Ok(host.to_string())
            }
        })
        .collect()
}
