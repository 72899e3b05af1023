//! Opens, closes or creates an encrypted storage stack: LUKS devices, the ZFS pool built on
//! them, and bind mounts of its datasets.
//!
//! ```text
//! zolcrypt [-v...] [-f|--force] [-s|--simulate] <ACTION> <CONFIG_FILE>
//! ```
//!
//! Only the steps the system still needs are run, so any action may be repeated safely. Set
//! `ZOLCRYPT_LOG` (for example `ZOLCRYPT_LOG=zolcrypt_reconcile=debug`) to override the
//! verbosity chosen with `-v`.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{span, Level};
use tracing_subscriber::EnvFilter;

mod args;
use args::CommandLineArgs;
use zolcrypt_config::ConfigFile;
use zolcrypt_host::SystemHost;
use zolcrypt_reconcile::{reconcile, RunOptions};

const LOG_ENV: &str = "ZOLCRYPT_LOG";

/// Level and pretty printing for the number of `-v` flags
fn log_level(verbosity: u8) -> (Level, bool) {
    match verbosity {
        0 => (Level::INFO, false),
        1 => (Level::DEBUG, false),
        2 => (Level::DEBUG, true),
        _ => (Level::TRACE, true),
    }
}

fn init_logger(verbosity: u8) {
    let (level, pretty) = log_level(verbosity);
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let sub = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);
    if pretty {
        sub.pretty().init();
    } else {
        sub.init();
    }
}

fn main() -> Result<()> {
    let CommandLineArgs {
        action,
        config_file,
        force,
        simulate,
        verbose,
    } = CommandLineArgs::parse();

    init_logger(verbose);
    let span = span!(Level::DEBUG, "main", action = action.as_str());
    let _guard = span.enter();

    let config = ConfigFile::load(&config_file)?;
    if simulate {
        tracing::warn!("Simulating only, no changes will be made");
    }

    let mut host = SystemHost::new();
    let report = reconcile(action, &config, RunOptions { force, simulate }, &mut host)
        .with_context(|| format!("Failed to {action} the storage stack of {config_file}"))?;
    tracing::info!("{report}");
    Ok(())
}
