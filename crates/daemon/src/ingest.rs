//! Disc ingestion loop
//!
//! One cycle probes the drive, mounts a volume to look for the video marker,
//! classifies the disc, runs its extraction workflow, then releases the mount
//! and ejects. Every per-cycle error is logged and the loop carries on.

use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::classify::{classify, has_video_marker, DiscClassification, DiscKind};
use crate::drive::DriveHandle;
use crate::extract::{ExtractError, ExtractOutcome, Extractor};
use crate::mount::MountManager;
use crate::probe::{probe_drive, ProbeOutcome};
use crate::process::ProcessRunner;

/// What one ingestion cycle did
#[derive(Debug)]
pub struct CycleReport {
    pub kind: DiscKind,
    pub outcome: Result<ExtractOutcome, ExtractError>,
    pub ejected: bool,
}

impl CycleReport {
    fn idle() -> Self {
        Self {
            kind: DiscKind::NoDisc,
            outcome: Ok(ExtractOutcome::Idle),
            ejected: false,
        }
    }

    fn log(&self) {
        match &self.outcome {
            Ok(ExtractOutcome::Idle) => debug!("No disc in drive"),
            Ok(outcome) => info!("Cycle finished for {}: {:?}", self.kind, outcome),
            Err(e) => error!("Extraction of {} failed: {}", self.kind, e),
        }
    }
}

/// Runs ingestion cycles against one drive.
pub struct Ingestor {
    runner: Arc<dyn ProcessRunner>,
    drive: DriveHandle,
    mounts: Arc<Mutex<MountManager>>,
    extractor: Extractor,
    skip_eject: bool,
    use_sudo: bool,
}

impl Ingestor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        drive: DriveHandle,
        mounts: Arc<Mutex<MountManager>>,
        extractor: Extractor,
        skip_eject: bool,
        use_sudo: bool,
    ) -> Self {
        Self {
            runner,
            drive,
            mounts,
            extractor,
            skip_eject,
            use_sudo,
        }
    }

    fn lock_mounts(&self) -> MutexGuard<'_, MountManager> {
        self.mounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Probe, then mount a volume long enough to check for the video marker.
    fn probe_and_classify(&self) -> DiscClassification {
        let probe = probe_drive(self.runner.as_ref(), &self.drive);
        if !matches!(probe, ProbeOutcome::Volume(_)) {
            return classify(&probe, false);
        }

        let mut mounts = self.lock_mounts();
        let record = match mounts.mount(&self.drive) {
            Ok(record) => record,
            Err(e) => {
                warn!("Mount failed, classifying without filesystem: {}", e);
                return classify(&probe, false);
            }
        };
        let marker = has_video_marker(record.mount_point());
        mounts.unmount(record);
        classify(&probe, marker)
    }

    /// Run one ingestion cycle. Blocks for as long as the extraction tool runs.
    pub fn step(&self) -> CycleReport {
        let classification = self.probe_and_classify();
        let kind = classification.kind();
        if kind == DiscKind::NoDisc {
            return CycleReport::idle();
        }

        info!("Detected {} disc", kind);
        let outcome = self.extractor.dispatch(&self.drive, &classification);

        let ejected = if self.skip_eject {
            false
        } else {
            match self.drive.eject(self.runner.as_ref(), self.use_sudo) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Eject of {} failed: {}", self.drive.path().display(), e);
                    false
                }
            }
        };

        CycleReport {
            kind,
            outcome,
            ejected,
        }
    }
}

/// Run ingestion cycles every `poll_interval` until `shutdown` turns true.
///
/// Each cycle runs on a blocking thread. An in-flight cycle is not
/// interrupted; shutdown is noticed between cycles.
pub async fn run_ingest_loop(
    ingestor: Arc<Ingestor>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Ingestion loop started (poll every {:?})", poll_interval);
    while !*shutdown.borrow() {
        let worker = Arc::clone(&ingestor);
        match tokio::task::spawn_blocking(move || worker.step()).await {
            Ok(report) => report.log(),
            Err(e) => error!("Ingestion cycle aborted: {}", e),
        }

        tokio::select! {
            _ = sleep(poll_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    info!("Ingestion loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::temp_paths;
    use crate::fingerprint::ContentFingerprint;
    use crate::testing::{Call, FakeRunner, Reply};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const MOVIE_BLKID: &str = r#"/dev/sr0: LABEL="MOVIE" UUID="abc123" TYPE="udf""#;

    /// A fake drive holding a DVD: blkid reports the volume, mounting exposes
    /// VIDEO_TS, and makemkvcon writes one title.
    fn dvd_drive(call: &Call) -> Reply {
        match call.tool() {
            "blkid" => Reply::Output(MOVIE_BLKID.to_string()),
            "mount" => {
                fs::create_dir_all(Path::new(&call.args[1]).join("VIDEO_TS")).unwrap();
                Reply::Output(String::new())
            }
            "makemkvcon" => {
                let dest = Path::new(call.args.last().unwrap());
                fs::write(dest.join("title_t00.mkv"), vec![0u8; 64]).unwrap();
                Reply::Output(String::new())
            }
            _ => Reply::Output(String::new()),
        }
    }

    fn ingestor(temp: &TempDir, runner: &Arc<FakeRunner>, skip_eject: bool) -> Ingestor {
        let mounts = MountManager::new(runner.clone(), temp.path().join("mnt"), false);
        Ingestor::new(
            runner.clone(),
            DriveHandle::new("/dev/sr0", None).unwrap(),
            Arc::new(Mutex::new(mounts)),
            Extractor::new(runner.clone(), temp_paths(temp), None),
            skip_eject,
            false,
        )
    }

    #[test]
    fn test_empty_drive_is_idle() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(|_| Reply::Exit(2)));
        let report = ingestor(&temp, &runner, false).step();

        assert_eq!(report.kind, DiscKind::NoDisc);
        assert!(!report.ejected);
        assert!(runner.calls_to("mount").is_empty());
        assert!(runner.calls_to("eject").is_empty());
    }

    #[test]
    fn test_dvd_cycle_rips_into_identity_staging() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(dvd_drive));
        let report = ingestor(&temp, &runner, false).step();

        assert_eq!(report.kind, DiscKind::DvdVideo);
        assert!(report.ejected);
        let staged = temp.path().join("wip").join("dvd").join("MOVIE-abc123");
        assert!(matches!(report.outcome, Ok(ExtractOutcome::Staged(ref p)) if *p == staged));

        let rip = &runner.calls_to("makemkvcon")[0];
        assert_eq!(rip.args[2], "disc:0");
        assert!(rip.args[4].contains("MOVIE-abc123"));

        // mount released before extraction, then eject
        let order: Vec<String> = runner.calls().iter().map(|c| c.tool().to_string()).collect();
        assert_eq!(order, ["blkid", "mount", "umount", "makemkvcon", "eject"]);
    }

    #[test]
    fn test_volume_without_marker_is_data_disc() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(|call| match call.tool() {
            "blkid" => Reply::Output(MOVIE_BLKID.to_string()),
            "dd" => {
                let target = call.args.iter().find_map(|a| a.strip_prefix("of=")).unwrap();
                fs::write(target, b"iso").unwrap();
                Reply::Output(String::new())
            }
            _ => Reply::Output(String::new()),
        }));
        let report = ingestor(&temp, &runner, true).step();

        assert_eq!(report.kind, DiscKind::DataDisc);
        assert!(matches!(report.outcome, Ok(ExtractOutcome::Completed(_))));
        assert!(temp.path().join("iso").join("MOVIE-abc123.iso").is_file());
        assert!(!report.ejected);
        assert_eq!(runner.calls_to("dd").len(), 1);
        assert!(runner.calls_to("eject").is_empty());
    }

    #[test]
    fn test_mount_failure_falls_back_to_data_disc() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(|call| match call.tool() {
            "blkid" => Reply::Output(MOVIE_BLKID.to_string()),
            "mount" => Reply::Exit(32),
            _ => Reply::Output(String::new()),
        }));
        let report = ingestor(&temp, &runner, false).step();

        assert_eq!(report.kind, DiscKind::DataDisc);
        assert!(runner.calls_to("umount").is_empty());
    }

    const SIX_TRACK_TOC: &str = "\
Table of contents (audio tracks only):
track        length               begin        copy pre ch
===========================================================
  1.      100 [00:01.25]        0 [00:00.00]    no   no  2
  2.      200 [00:02.50]      100 [00:01.25]    no   no  2
  3.      150 [00:02.00]      300 [00:04.00]    no   no  2
  4.      300 [00:04.00]      450 [00:06.00]    no   no  2
  5.      250 [00:03.25]      750 [00:10.00]    no   no  2
  6.      175 [00:02.25]     1000 [00:13.25]    no   no  2
TOTAL    1175 [00:15.50]    (audio only)";

    fn audio_drive(call: &Call) -> Reply {
        match call.tool() {
            "blkid" => Reply::Exit(2),
            "cdparanoia" => Reply::Output(SIX_TRACK_TOC.to_string()),
            _ => Reply::Output(String::new()),
        }
    }

    #[test]
    fn test_known_audio_disc_runs_only_the_probes() {
        let temp = TempDir::new().unwrap();
        let fingerprint =
            ContentFingerprint::from_track_lengths(&[100, 200, 150, 300, 250, 175]);
        assert_eq!(ContentFingerprint::from_toc(SIX_TRACK_TOC), Some(fingerprint.clone()));
        fs::create_dir_all(temp.path().join("redbook").join(format!("Album-{}", fingerprint)))
            .unwrap();

        let runner = Arc::new(FakeRunner::new(audio_drive));
        let report = ingestor(&temp, &runner, true).step();

        assert_eq!(report.kind, DiscKind::RedbookAudio);
        assert!(matches!(report.outcome, Ok(ExtractOutcome::AlreadyPresent(_))));
        let tools: Vec<String> = runner.calls().iter().map(|c| c.tool().to_string()).collect();
        assert_eq!(tools, ["blkid", "cdparanoia"]);
    }

    #[test]
    fn test_known_audio_disc_is_still_ejected() {
        let temp = TempDir::new().unwrap();
        let fingerprint =
            ContentFingerprint::from_track_lengths(&[100, 200, 150, 300, 250, 175]);
        fs::create_dir_all(temp.path().join("redbook").join(format!("Album-{}", fingerprint)))
            .unwrap();

        let runner = Arc::new(FakeRunner::new(audio_drive));
        let report = ingestor(&temp, &runner, false).step();

        assert!(report.ejected);
        assert!(runner.calls_to("abcde").is_empty());
    }

    #[test]
    fn test_unreadable_toc_fails_cycle_without_ripping() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(|call| match call.tool() {
            "blkid" => Reply::Exit(2),
            "cdparanoia" => Reply::Output("cdparanoia III release 10.2".to_string()),
            _ => Reply::Output(String::new()),
        }));
        let report = ingestor(&temp, &runner, false).step();

        assert_eq!(report.kind, DiscKind::RedbookAudio);
        assert!(matches!(report.outcome, Err(ExtractError::UnreadableToc)));
        assert!(runner.calls_to("abcde").is_empty());
        assert!(report.ejected);
    }

    #[test]
    fn test_failed_extraction_still_ejects() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(|call| match call.tool() {
            "makemkvcon" => Reply::Exit(1),
            _ => dvd_drive(call),
        }));
        let report = ingestor(&temp, &runner, false).step();

        assert!(matches!(report.outcome, Err(ExtractError::Tool(_))));
        assert!(report.ejected);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(|_| Reply::Exit(2)));
        let ingestor = Arc::new(ingestor(&temp, &runner, false));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_ingest_loop(ingestor, Duration::from_millis(10), rx));
        sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(!runner.calls_to("blkid").is_empty());
    }
}
