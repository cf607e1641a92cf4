// ABOUTME: sxinit library: configures, inspects and removes access profiles for SX clusters.
// ABOUTME: The binary wires these pieces to the terminal, the network and the real config root.

pub mod bootstrap;
pub mod error;
pub mod interrupt;
pub mod link;
pub mod options;
pub mod prompt;
pub mod secret;
pub mod token;
pub mod trust;

pub use bootstrap::Bootstrap;
pub use error::{InitError, TokenError};
pub use interrupt::InterruptContext;
pub use link::{parse_configuration_link, parse_link_text, ConfigurationLink};
pub use options::{InitOptions, InitPlan, Mode, Target};
pub use prompt::{Prompter, TerminalPrompter};
pub use secret::SecretBuffer;
pub use token::{Token, TokenSource};

use std::io;
use std::sync::Arc;
use sx_cluster::HttpConnector;
use sx_config::ProfileStore;

/// Validates `options` and runs the selected workflow against real clusters.
pub fn run(options: &InitOptions, interrupt: Arc<InterruptContext>) -> Result<(), InitError> {
    let mode = options.validate()?;
    let store = ProfileStore::open(options.config_dir.as_deref()).map_err(|e| {
        InitError::config_directory("Could not set configuration directory", e)
    })?;

    let mut bootstrap =
        Bootstrap::new(store, HttpConnector, TerminalPrompter).with_interrupt(interrupt);
    let mut stdout = io::stdout().lock();
    bootstrap.run(&mode, &mut stdout)
}
