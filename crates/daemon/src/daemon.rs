//! Daemon startup and main loops for the disc ingestion daemon
//!
//! Builds every component from the configuration, then runs the ingestion
//! loop and the transcode watcher side by side until a shutdown signal.

use log::{error, info, warn};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{Config, ConfigError};
use crate::drive::{DriveError, DriveHandle};
use crate::extract::Extractor;
use crate::ingest::{run_ingest_loop, Ingestor};
use crate::keyrefresh::{ForumKeySource, KeyRefresher};
use crate::mount::MountManager;
use crate::process::{ProcessRunner, SystemRunner};
use crate::startup::{run_startup_checks, StartupError};
use crate::watcher::{run_watcher_loop, TranscodeWatcher};

/// How long loops may take to notice shutdown before they are abandoned
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    #[error("Drive error: {0}")]
    Drive(#[from] DriveError),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    pub config: Config,
    ingestor: Arc<Ingestor>,
    watcher: Arc<TranscodeWatcher>,
    mounts: Arc<Mutex<MountManager>>,
}

impl Daemon {
    /// Load the config file (plus environment overrides), run startup checks
    /// and build the daemon.
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, DaemonError> {
        let config = Config::load(config_path)?;
        Self::with_config(config)
    }

    /// Run startup checks against an already loaded configuration
    pub fn with_config(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config)?;
        Self::new_without_checks(config)
    }

    /// Build the daemon without checking for tools or the drive.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        Self::with_runner(config, Arc::new(SystemRunner))
    }

    /// Build the daemon around a specific process runner
    pub fn with_runner(config: Config, runner: Arc<dyn ProcessRunner>) -> Result<Self, DaemonError> {
        let drive = DriveHandle::new(config.drive.path.clone(), config.drive.index)?;
        info!(
            "Using drive {} (extraction index {})",
            drive.path().display(),
            drive.index()
        );

        let mounts = Arc::new(Mutex::new(MountManager::new(
            Arc::clone(&runner),
            config.drive.mount_root.clone(),
            config.drive.use_sudo,
        )));

        let extractor = Extractor::new(
            Arc::clone(&runner),
            config.paths.clone(),
            build_key_refresher(&config),
        );

        let ingestor = Arc::new(Ingestor::new(
            Arc::clone(&runner),
            drive,
            Arc::clone(&mounts),
            extractor,
            config.drive.skip_eject,
            config.drive.use_sudo,
        ));

        let watcher = Arc::new(TranscodeWatcher::from_config(
            runner,
            &config.paths,
            &config.watcher,
        ));

        Ok(Self {
            config,
            ingestor,
            watcher,
            mounts,
        })
    }

    /// Run both loops until Ctrl+C or SIGTERM
    pub async fn run(&self) {
        self.run_until(shutdown_signal()).await
    }

    /// Run both loops until `signal` completes, then stop them and release
    /// every mount.
    ///
    /// Tools already running are not interrupted; if a loop is still busy
    /// after the grace period it is abandoned. Mounts are released either way.
    pub async fn run_until<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut ingest = tokio::spawn(run_ingest_loop(
            Arc::clone(&self.ingestor),
            Duration::from_secs(self.config.ingest.poll_interval_secs),
            shutdown_rx.clone(),
        ));
        let mut watcher = tokio::spawn(run_watcher_loop(
            Arc::clone(&self.watcher),
            Duration::from_secs(self.config.watcher.scan_interval_secs),
            shutdown_rx,
        ));

        signal.await;
        info!("Shutdown requested, stopping loops");
        let _ = shutdown_tx.send(true);

        let stopped = tokio::time::timeout(SHUTDOWN_GRACE, async {
            if let Err(e) = (&mut ingest).await {
                error!("Ingestion loop ended abnormally: {}", e);
            }
            if let Err(e) = (&mut watcher).await {
                error!("Transcode watcher ended abnormally: {}", e);
            }
        })
        .await;
        if stopped.is_err() {
            warn!(
                "Loops still busy after {:?}; abandoning in-flight work",
                SHUTDOWN_GRACE
            );
            ingest.abort();
            watcher.abort();
        }

        self.release_mounts().await;
        info!("Shutdown complete");
    }

    async fn release_mounts(&self) {
        let mounts = Arc::clone(&self.mounts);
        let released = tokio::task::spawn_blocking(move || {
            mounts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .unmount_all();
        })
        .await;
        if let Err(e) = released {
            error!("Releasing mounts failed: {}", e);
        }
    }
}

fn build_key_refresher(config: &Config) -> Option<KeyRefresher> {
    if !config.key_refresh.enabled {
        return None;
    }
    match config.key_refresh.resolved_settings_path() {
        Some(settings_path) => Some(KeyRefresher::new(
            Box::new(ForumKeySource::new(config.key_refresh.url.clone())),
            settings_path,
        )),
        None => {
            warn!("Key refresh enabled but no settings path could be resolved; disabled");
            None
        }
    }
}

/// Completes on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeRunner, Reply};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::sleep;

    fn create_test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.drive.mount_root = root.join("mnt");
        config.drive.use_sudo = false;
        config.paths.staging_root = root.join("wip");
        config.paths.dvd_output = root.join("dvd");
        config.paths.redbook_output = root.join("redbook");
        config.paths.iso_output = root.join("iso");
        config.paths.bluray_output = root.join("bluray");
        config.ingest.poll_interval_secs = 1;
        config.watcher.scan_interval_secs = 1;
        config.watcher.settle_secs = 1;
        config
    }

    /// Drive with the MOVIE DVD, plus a transcoder that writes its output
    fn movie_dvd(call: &Call) -> Reply {
        match call.tool() {
            "blkid" => Reply::Output(r#"/dev/sr0: LABEL="MOVIE" UUID="abc123""#.to_string()),
            "mount" => {
                fs::create_dir_all(Path::new(&call.args[1]).join("VIDEO_TS")).unwrap();
                Reply::Output(String::new())
            }
            "makemkvcon" => {
                let title = Path::new(call.args.last().unwrap()).join("title_t00.mkv");
                fs::File::create(title).unwrap().set_len(50 * 1024 * 1024).unwrap();
                Reply::Output(String::new())
            }
            "HandBrakeCLI" => {
                fs::write(&call.args[3], b"mp4").unwrap();
                Reply::Output(String::new())
            }
            _ => Reply::Output(String::new()),
        }
    }

    #[test]
    fn test_daemon_initialization_without_checks() {
        let temp = TempDir::new().unwrap();
        let config = create_test_config(temp.path());
        let daemon = Daemon::new_without_checks(config.clone()).unwrap();
        assert_eq!(daemon.config, config);
    }

    #[test]
    fn test_drive_without_index_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = create_test_config(temp.path());
        config.drive.path = "/dev/cdrom".into();
        assert!(matches!(
            Daemon::new_without_checks(config),
            Err(DaemonError::Drive(_))
        ));
    }

    #[test]
    fn test_key_refresher_only_when_enabled() {
        let temp = TempDir::new().unwrap();
        let mut config = create_test_config(temp.path());
        assert!(build_key_refresher(&config).is_none());

        config.key_refresh.enabled = true;
        config.key_refresh.settings_path = Some(temp.path().join("settings.conf"));
        assert!(build_key_refresher(&config).is_some());
    }

    #[tokio::test]
    async fn test_dvd_flows_from_drive_to_output() {
        let temp = TempDir::new().unwrap();
        let config = create_test_config(temp.path());
        let runner = Arc::new(FakeRunner::new(movie_dvd));
        let daemon = Daemon::with_runner(config, runner.clone()).unwrap();

        let output = temp.path().join("dvd").join("MOVIE-abc123").join("title_t00.mp4");
        let staged = temp
            .path()
            .join("wip")
            .join("dvd")
            .join("MOVIE-abc123")
            .join("title_t00.mkv");

        let done = {
            let output = output.clone();
            let staged = staged.clone();
            async move {
                while !(output.exists() && !staged.exists()) {
                    sleep(Duration::from_millis(50)).await;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(20), daemon.run_until(done))
            .await
            .unwrap();

        assert!(output.is_file());
        assert!(!staged.exists());
        let rips = runner.calls_to("makemkvcon");
        assert_eq!(rips.len(), 1);
        assert_eq!(rips[0].args[2], "disc:0");
        assert!(rips[0].args[4].contains("MOVIE-abc123"));
        assert_eq!(runner.calls_to("HandBrakeCLI").len(), 1);
        assert_eq!(runner.calls_to("mount").len(), runner.calls_to("umount").len());
    }

    #[tokio::test]
    async fn test_shutdown_releases_outstanding_mounts() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(|call| match call.tool() {
            "mount" | "umount" => Reply::Output(String::new()),
            _ => Reply::Exit(2),
        }));
        let daemon = Daemon::with_runner(create_test_config(temp.path()), runner.clone()).unwrap();

        let drive = DriveHandle::new("/dev/sr1", None).unwrap();
        let _outstanding = daemon.mounts.lock().unwrap().mount(&drive).unwrap();

        daemon.run_until(sleep(Duration::from_millis(20))).await;
        assert_eq!(daemon.mounts.lock().unwrap().active_count(), 0);
        assert_eq!(runner.calls_to("umount").len(), 1);
    }
}
