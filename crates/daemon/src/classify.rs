//! Classifier module for categorizing the inserted disc.
//!
//! Turns probe results into exactly one [`DiscClassification`] per ingestion
//! cycle. Classification is total: every probe outcome maps to a variant.

use crate::fingerprint::ContentFingerprint;
use crate::probe::{ProbeOutcome, VolumeMetadata};
use std::path::Path;

/// Directory names that mark a DVD-Video filesystem
const VIDEO_MARKERS: &[&str] = &["VIDEO_TS", "video_ts"];

/// Kind of disc, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscKind {
    NoDisc,
    RedbookAudio,
    DvdVideo,
    DataDisc,
    BlurayVideo,
}

impl std::fmt::Display for DiscKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscKind::NoDisc => write!(f, "no_disc"),
            DiscKind::RedbookAudio => write!(f, "redbook_audio"),
            DiscKind::DvdVideo => write!(f, "dvd_video"),
            DiscKind::DataDisc => write!(f, "data_disc"),
            DiscKind::BlurayVideo => write!(f, "bluray_video"),
        }
    }
}

/// Classification of the disc in the drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscClassification {
    NoDisc,
    /// `fingerprint` is `None` when the TOC listed no readable tracks.
    RedbookAudio { fingerprint: Option<ContentFingerprint> },
    DvdVideo { metadata: VolumeMetadata },
    DataDisc { metadata: VolumeMetadata },
    /// Never produced by [`classify`]; no detection rule exists yet.
    BlurayVideo { metadata: VolumeMetadata },
}

impl DiscClassification {
    pub fn kind(&self) -> DiscKind {
        match self {
            DiscClassification::NoDisc => DiscKind::NoDisc,
            DiscClassification::RedbookAudio { .. } => DiscKind::RedbookAudio,
            DiscClassification::DvdVideo { .. } => DiscKind::DvdVideo,
            DiscClassification::DataDisc { .. } => DiscKind::DataDisc,
            DiscClassification::BlurayVideo { .. } => DiscKind::BlurayVideo,
        }
    }
}

/// Classify a disc from its probe outcome.
///
/// Decision order, first match wins:
/// 1. no metadata, no TOC -> NoDisc
/// 2. no metadata, TOC -> RedbookAudio (fingerprinted from the TOC)
/// 3. metadata and a video marker at the mount point -> DvdVideo
/// 4. metadata, no marker -> DataDisc
pub fn classify(probe: &ProbeOutcome, video_marker_present: bool) -> DiscClassification {
    match probe {
        ProbeOutcome::NoDisc => DiscClassification::NoDisc,
        ProbeOutcome::AudioToc(toc) => DiscClassification::RedbookAudio {
            fingerprint: ContentFingerprint::from_toc(toc),
        },
        ProbeOutcome::Volume(metadata) if video_marker_present => DiscClassification::DvdVideo {
            metadata: metadata.clone(),
        },
        ProbeOutcome::Volume(metadata) => DiscClassification::DataDisc {
            metadata: metadata.clone(),
        },
    }
}

/// Whether a mounted volume carries a DVD-Video marker directory
pub fn has_video_marker(mount_point: &Path) -> bool {
    VIDEO_MARKERS
        .iter()
        .any(|marker| mount_point.join(marker).is_dir())
}
