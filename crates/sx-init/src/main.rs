// ABOUTME: Entry point for sxinit
// ABOUTME: Parses flags, sets up logging and interrupt handling, and reports errors

use anyhow::anyhow;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use sx_init::{InitError, InitOptions, InterruptContext};

#[derive(Parser)]
#[command(
    name = "sxinit",
    about = "Configure access to an SX cluster",
    version
)]
struct Cli {
    /// Cluster address: sx://[profile@]cluster, or an alias
    #[arg(value_name = "SX_URI")]
    addresses: Vec<String>,

    /// List configured profiles
    #[arg(long, short = 'L')]
    list: bool,

    /// Configure from a configuration link: the link itself, a file holding it, or - for stdin
    #[arg(long, short = 'C', value_name = "LINK|FILE|-")]
    config_link: Option<String>,

    /// Configuration directory (defaults to ~/.sx)
    #[arg(long, short = 'c', env = "SX_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Comma separated node addresses, for clusters without a DNS entry
    #[arg(long, short = 'l', value_name = "IP1,IP2,...")]
    host_list: Option<String>,

    /// Talk to the cluster over plain HTTP
    #[arg(long)]
    no_ssl: bool,

    /// Use a non-default port
    #[arg(long, short = 'P', allow_negative_numbers = true)]
    port: Option<i64>,

    /// Bind an alias (sx://name) to the configured profile
    #[arg(long, short = 'A')]
    alias: Option<String>,

    /// Delete the profile; the cluster configuration goes with its last profile
    #[arg(long)]
    delete: bool,

    /// Show information about a configured profile
    #[arg(long, short = 'I')]
    info: bool,

    /// Discard the existing cluster configuration
    #[arg(long)]
    force_reinit: bool,

    /// Read the user key from a file, or type it in with -
    #[arg(long, short = 'a', value_name = "FILE")]
    auth_file: Option<String>,

    /// Type in the user key instead of a password
    #[arg(long, short = 'k')]
    key: bool,

    /// Read the password from a file
    #[arg(long, short = 'p', value_name = "FILE")]
    pass_file: Option<String>,

    /// Never ask questions; trust what the cluster presents
    #[arg(long, short = 'b')]
    batch: bool,

    /// Verbose logging
    #[arg(long, short = 'D')]
    debug: bool,
}

impl Cli {
    fn into_options(self) -> InitOptions {
        InitOptions {
            addresses: self.addresses,
            list: self.list,
            config_link: self.config_link,
            config_dir: self.config_dir,
            host_list: self.host_list,
            no_ssl: self.no_ssl,
            port: self.port,
            alias: self.alias,
            delete: self.delete,
            info: self.info,
            force_reinit: self.force_reinit,
            auth_file: self.auth_file,
            key: self.key,
            pass_file: self.pass_file,
            batch: self.batch,
        }
    }
}

fn report(err: &anyhow::Error) {
    eprintln!("{} {err}", "ERROR:".red().bold());
    if let Some(err) = err.downcast_ref::<InitError>() {
        if matches!(err, InitError::Argument(_)) {
            eprintln!("Try 'sxinit --help' for more information.");
        }
        if let Some(hint) = err.remediation() {
            eprintln!("{hint}");
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    sx_log::init(cli.debug);

    let interrupt = InterruptContext::new();
    let result = interrupt
        .install()
        .map_err(|e| anyhow!("Failed to install signal handler: {e}"))
        .and_then(|()| {
            sx_init::run(&cli.into_options(), Arc::clone(&interrupt)).map_err(anyhow::Error::from)
        });
    interrupt.disarm();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}
