//! Transcode watcher
//!
//! Scans the video staging root on its own schedule and transcodes every
//! staged file that is known to be complete, deleting the staged copy after a
//! successful transcode. A file counts as complete when its entry carries the
//! extraction sentinel, or when it is at least the minimum size and its size
//! does not change across the settle window.
//!
//! The staging directory is the only channel between ingestion and this
//! loop, so anything left there survives a restart and is picked up again.

use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::{PathsConfig, WatcherConfig};
use crate::encode::{run_transcode, TranscodeParams};
use crate::extract::dvd_staging_root;
use crate::process::ProcessRunner;
use crate::scan::{entry_dirs, has_sentinel, scan_staging, StagedFile, SENTINEL_NAME};
use crate::stability::{check_stability, StabilityResult};

/// Counts from one watcher cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub transcoded: usize,
    /// Still being written, or vanished during the settle window
    pub deferred: usize,
    pub too_small: usize,
    pub failed: usize,
    /// Output already exists; staged file left alone
    pub conflicts: usize,
    pub drained_entries: usize,
}

impl WatchSummary {
    pub fn is_empty(&self) -> bool {
        *self == WatchSummary::default()
    }
}

pub struct TranscodeWatcher {
    runner: Arc<dyn ProcessRunner>,
    staging_root: PathBuf,
    output_root: PathBuf,
    settle: Duration,
    min_file_bytes: u64,
}

impl TranscodeWatcher {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        staging_root: PathBuf,
        output_root: PathBuf,
        settle: Duration,
        min_file_bytes: u64,
    ) -> Self {
        Self {
            runner,
            staging_root,
            output_root,
            settle,
            min_file_bytes,
        }
    }

    pub fn from_config(
        runner: Arc<dyn ProcessRunner>,
        paths: &PathsConfig,
        watcher: &WatcherConfig,
    ) -> Self {
        Self::new(
            runner,
            dvd_staging_root(&paths.staging_root),
            paths.dvd_output.clone(),
            Duration::from_secs(watcher.settle_secs),
            watcher.min_file_bytes,
        )
    }

    /// Scan staging once and process every staged file in order.
    pub async fn run_cycle(&self) -> WatchSummary {
        let mut summary = WatchSummary::default();

        for file in scan_staging(&self.staging_root) {
            if !has_sentinel(file.entry_dir()) && !self.is_settled(&file, &mut summary).await {
                continue;
            }
            self.transcode(&file, &mut summary).await;
        }

        summary.drained_entries = self.remove_drained_entries();
        summary
    }

    /// Size-stability check for an entry without a sentinel
    async fn is_settled(&self, file: &StagedFile, summary: &mut WatchSummary) -> bool {
        if file.size_bytes < self.min_file_bytes {
            debug!(
                "{} is {} bytes, below minimum; rechecking next cycle",
                file.path.display(),
                file.size_bytes
            );
            summary.too_small += 1;
            return false;
        }

        match check_stability(&file.path, file.size_bytes, self.settle).await {
            Ok(StabilityResult::Stable) => true,
            Ok(StabilityResult::Unstable {
                initial_size,
                current_size,
            }) => {
                debug!(
                    "{} still growing ({} -> {} bytes)",
                    file.path.display(),
                    initial_size,
                    current_size
                );
                summary.deferred += 1;
                false
            }
            Err(e) => {
                warn!("{} vanished during settle check: {}", file.path.display(), e);
                summary.deferred += 1;
                false
            }
        }
    }

    async fn transcode(&self, file: &StagedFile, summary: &mut WatchSummary) {
        let params =
            TranscodeParams::for_staged_file(&file.path, &self.output_root.join(&file.identity));
        if params.output_path.exists() {
            warn!(
                "Output {} already exists; leaving {} in staging",
                params.output_path.display(),
                file.path.display()
            );
            summary.conflicts += 1;
            return;
        }

        info!("Transcoding {}", file.path.display());
        let runner = Arc::clone(&self.runner);
        let job = params.clone();
        match tokio::task::spawn_blocking(move || run_transcode(runner.as_ref(), &job)).await {
            Ok(Ok(())) => {
                if let Err(e) = tokio::fs::remove_file(&file.path).await {
                    warn!("Transcoded but could not remove {}: {}", file.path.display(), e);
                }
                info!("Transcoded {}", params.output_path.display());
                summary.transcoded += 1;
            }
            Ok(Err(e)) => {
                warn!("Transcode of {} failed, will retry: {}", file.path.display(), e);
                summary.failed += 1;
            }
            Err(e) => {
                error!("Transcode task for {} aborted: {}", file.path.display(), e);
                summary.failed += 1;
            }
        }
    }

    /// Remove completed entries that hold nothing but their sentinel
    fn remove_drained_entries(&self) -> usize {
        let mut drained = 0;
        for dir in entry_dirs(&self.staging_root) {
            if !has_sentinel(&dir) || !only_sentinel_left(&dir) {
                continue;
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!("Staging entry {} drained", dir.display());
                    drained += 1;
                }
                Err(e) => warn!("Failed to remove drained entry {}: {}", dir.display(), e),
            }
        }
        drained
    }
}

fn only_sentinel_left(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .all(|e| e.file_name() == SENTINEL_NAME),
        Err(_) => false,
    }
}

/// Run watcher cycles every `scan_interval` until `shutdown` turns true.
///
/// A cycle in progress is finished before shutdown is noticed.
pub async fn run_watcher_loop(
    watcher: Arc<TranscodeWatcher>,
    scan_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        "Transcode watcher started on {} (scan every {:?})",
        watcher.staging_root.display(),
        scan_interval
    );
    while !*shutdown.borrow() {
        let summary = watcher.run_cycle().await;
        if !summary.is_empty() {
            info!("Watcher cycle: {:?}", summary);
        }

        tokio::select! {
            _ = sleep(scan_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    info!("Transcode watcher stopped");
}
