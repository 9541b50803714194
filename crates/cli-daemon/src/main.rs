//! CLI entry point for the disc ingestion daemon
//!
//! Parses command line arguments, sets up logging and runs the daemon until
//! Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use disc_ingest::{Config, Daemon, ForumKeySource, KeySource};
use log::{info, warn, LevelFilter};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Blocking tools still running at exit are abandoned after this long
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Unattended optical disc ingestion: rip, image and transcode whatever is inserted
#[derive(Parser, Debug)]
#[command(name = "disc-ingest")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (TOML). Defaults plus DISC_* environment
    /// variables are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Drive device path, overriding the configuration
    #[arg(short, long)]
    drive: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Leave discs in the tray after ingestion
    #[arg(long)]
    skip_eject: bool,

    /// Skip startup checks (tools on PATH, drive present). For testing only.
    #[arg(long)]
    skip_checks: bool,

    /// Fetch the current extraction key, print it and exit without writing
    /// the settings file
    #[arg(long)]
    print_key: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::from_env().context("Invalid configuration from environment")?,
    };

    if let Some(drive) = &args.drive {
        config.drive.path = drive.clone();
    }
    config.drive.skip_eject |= args.skip_eject;
    config.logging.debug |= args.debug;
    Ok(config)
}

fn print_key(source: &dyn KeySource, out: &mut impl Write) -> Result<()> {
    let key = source.fetch_key().context("Failed to fetch extraction key")?;
    writeln!(out, "{}", key)?;
    Ok(())
}

fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    // RUST_LOG, when set, takes precedence over the configured level
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(config.logging.debug);

    if args.print_key {
        let source = ForumKeySource::new(config.key_refresh.url.clone());
        return print_key(&source, &mut std::io::stdout().lock());
    }

    info!("Disc ingestion daemon starting");
    info!("  Drive: {}", config.drive.path.display());
    info!("  Staging root: {}", config.paths.staging_root.display());
    info!("  DVD output: {}", config.paths.dvd_output.display());
    info!("  Audio output: {}", config.paths.redbook_output.display());
    info!("  ISO output: {}", config.paths.iso_output.display());
    info!(
        "  Settle window: {}s, minimum file size: {} bytes",
        config.watcher.settle_secs, config.watcher.min_file_bytes
    );

    let daemon = if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)
    } else {
        Daemon::with_config(config)
    }
    .context("Failed to initialize daemon")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(daemon.run());
    // extraction tools still running are not waited for
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    Ok(())
}
