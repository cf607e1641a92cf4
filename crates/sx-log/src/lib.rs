// ABOUTME: Shared logging setup for the sx binaries
// ABOUTME: Logs go to stderr so they never mix with command output on stdout

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Picks the default level: WARN normally, DEBUG when `--debug` was given.
pub fn default_level(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

/// Stderr logging for CLI tools. RUST_LOG overrides the default level.
pub fn init(debug: bool) {
    let filter = EnvFilter::from_default_env().add_directive(default_level(debug).into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}
