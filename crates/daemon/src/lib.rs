//! Disc ingestion daemon
//!
//! Watches an optical drive, classifies each inserted disc, extracts it into
//! staging or straight to output, and transcodes staged video in a separate
//! loop that only touches files known to be complete.

pub mod classify;
pub mod commands;
pub mod daemon;
pub mod drive;
pub mod encode;
pub mod extract;
pub mod fingerprint;
pub mod ingest;
pub mod keyrefresh;
pub mod mount;
pub mod probe;
pub mod process;
pub mod relocate;
pub mod scan;
pub mod stability;
pub mod startup;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use classify::{classify, has_video_marker, DiscClassification, DiscKind};
pub use daemon::{Daemon, DaemonError};
pub use disc_ingest_config as config;
pub use disc_ingest_config::Config;
pub use drive::{DriveError, DriveHandle};
pub use encode::{build_handbrake_command, run_transcode, EncodeError, TranscodeParams};
pub use extract::{ExtractError, ExtractOutcome, Extractor};
pub use fingerprint::ContentFingerprint;
pub use ingest::{run_ingest_loop, CycleReport, Ingestor};
pub use keyrefresh::{ForumKeySource, KeyRefreshError, KeyRefresher, KeySource};
pub use mount::{MountError, MountManager, MountRecord};
pub use probe::{probe_drive, MetadataError, ProbeOutcome, VolumeMetadata};
pub use process::{ProcessError, ProcessRunner, SystemRunner};
pub use startup::{run_startup_checks, StartupError};
pub use watcher::{run_watcher_loop, TranscodeWatcher, WatchSummary};
