//! Extraction dispatch
//!
//! Runs the extraction workflow for a classified disc. Every workflow checks
//! its output identity first and does nothing when the output already exists.
//!
//! - video: rips into staging and returns; transcoding is the watcher's job
//! - audio: rips and moves the album straight to output
//! - data: copies the raw device to an image in output

mod data;
mod dvd;
mod redbook;

use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::classify::DiscClassification;
use crate::config::PathsConfig;
use crate::drive::DriveHandle;
use crate::keyrefresh::KeyRefresher;
use crate::probe::MetadataError;
use crate::process::{ProcessError, ProcessRunner};
use crate::relocate::RelocateError;

/// Error type for extraction workflows
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Extraction tool failed: {0}")]
    Tool(#[from] ProcessError),

    #[error("Filesystem error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Audio table of contents lists no readable tracks")]
    UnreadableToc,

    #[error("Expected exactly one album directory in {dir}, found {found}")]
    UnexpectedStaging { dir: PathBuf, found: usize },

    #[error("Failed to move extracted content: {0}")]
    Relocate(#[from] RelocateError),
}

/// Build a `map_err` adapter that tags an IO error with its path
pub(crate) fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ExtractError + '_ {
    move |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What an extraction workflow did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// Nothing to extract
    Idle,
    /// The output identity already exists; no tool was run
    AlreadyPresent(PathBuf),
    /// Files were ripped into this staging entry for the transcode watcher
    Staged(PathBuf),
    /// Content is in its final place at this path
    Completed(PathBuf),
    /// No workflow exists for this disc type
    Unimplemented,
}

/// Video staging root: `<staging_root>/dvd`
pub fn dvd_staging_root(staging_root: &Path) -> PathBuf {
    staging_root.join("dvd")
}

/// Audio staging directory: `<staging_root>/redbook`
pub fn redbook_staging_dir(staging_root: &Path) -> PathBuf {
    staging_root.join("redbook")
}

/// Runs extraction workflows against one set of staging and output roots.
pub struct Extractor {
    runner: Arc<dyn ProcessRunner>,
    paths: PathsConfig,
    key_refresher: Option<KeyRefresher>,
}

impl Extractor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        paths: PathsConfig,
        key_refresher: Option<KeyRefresher>,
    ) -> Self {
        Self {
            runner,
            paths,
            key_refresher,
        }
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    /// Run the workflow matching the classification
    pub fn dispatch(
        &self,
        drive: &DriveHandle,
        classification: &DiscClassification,
    ) -> Result<ExtractOutcome, ExtractError> {
        match classification {
            DiscClassification::NoDisc => Ok(ExtractOutcome::Idle),
            DiscClassification::RedbookAudio {
                fingerprint: Some(fingerprint),
            } => self.extract_redbook(drive, fingerprint),
            // without a fingerprint neither dedup nor the output name is possible
            DiscClassification::RedbookAudio { fingerprint: None } => {
                Err(ExtractError::UnreadableToc)
            }
            DiscClassification::DvdVideo { metadata } => self.extract_dvd(drive, metadata),
            DiscClassification::DataDisc { metadata } => self.extract_data(drive, metadata),
            DiscClassification::BlurayVideo { .. } => {
                info!(
                    "Blu-ray extraction is not implemented; nothing written to {}",
                    self.paths.bluray_output.display()
                );
                Ok(ExtractOutcome::Unimplemented)
            }
        }
    }
}
