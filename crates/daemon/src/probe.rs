//! Device probe: reads volume metadata from the drive and falls back to an
//! audio table-of-contents query when the disc has no filesystem.

use log::{debug, warn};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

use crate::commands::{build_blkid_command, build_toc_query_command};
use crate::drive::DriveHandle;
use crate::process::{ProcessError, ProcessRunner};

/// A required metadata key was not reported for the volume
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Volume metadata is missing required field {0}")]
    MissingField(&'static str),
}

/// Key/value metadata of a volume as reported by the probe tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeMetadata {
    fields: BTreeMap<String, String>,
}

impl VolumeMetadata {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn required(&self, key: &'static str) -> Result<&str, MetadataError> {
        self.get(key).ok_or(MetadataError::MissingField(key))
    }

    pub fn label(&self) -> Result<&str, MetadataError> {
        self.required("LABEL")
    }

    pub fn uuid(&self) -> Result<&str, MetadataError> {
        self.required("UUID")
    }

    /// `<LABEL>-<UUID>`, the disc identity used for staging and output names.
    ///
    /// Path separators and NUL in the label are replaced with `_`.
    pub fn identity(&self) -> Result<String, MetadataError> {
        let label = self.label()?;
        let uuid = self.uuid()?;
        Ok(sanitize_component(&format!("{}-{}", label, uuid)))
    }
}

fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect()
}

fn param_regex() -> &'static Regex {
    static PARAM: OnceLock<Regex> = OnceLock::new();
    PARAM.get_or_init(|| Regex::new(r#"(\w+)="([^"]+)""#).expect("static regex is valid"))
}

/// Parse `A="B" C="D"` pairs. Values may contain spaces but are always quoted;
/// empty values are dropped.
pub fn parse_blkid_params(params: &str) -> BTreeMap<String, String> {
    param_regex()
        .captures_iter(params)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Parse full probe output, one `<device>: <params>` line per device.
pub fn parse_blkid(output: &str) -> BTreeMap<String, VolumeMetadata> {
    output
        .lines()
        .filter_map(|line| {
            let (device, params) = line.split_once(": ")?;
            Some((
                device.trim().to_string(),
                VolumeMetadata::new(parse_blkid_params(params)),
            ))
        })
        .collect()
}

/// What the drive reported this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A volume with a filesystem
    Volume(VolumeMetadata),
    /// No filesystem, but an audio table of contents (raw tool output)
    AudioToc(String),
    /// Nothing readable in the drive
    NoDisc,
}

/// Probe the drive.
///
/// An empty or failed metadata probe is ambiguous, so the audio TOC is queried
/// next; if that fails too the drive is treated as empty. Probe failures are
/// logged here and never surface as errors.
pub fn probe_drive(runner: &dyn ProcessRunner, drive: &DriveHandle) -> ProbeOutcome {
    if let Some(metadata) = probe_volume(runner, drive) {
        return ProbeOutcome::Volume(metadata);
    }

    match runner.capture(build_toc_query_command(drive.path())) {
        Ok(toc) => ProbeOutcome::AudioToc(toc),
        Err(ProcessError::Failed { code, .. }) => {
            debug!("TOC probe exited with {}, no disc detected", code);
            ProbeOutcome::NoDisc
        }
        Err(e) => {
            warn!("TOC probe failed: {}", e);
            ProbeOutcome::NoDisc
        }
    }
}

fn probe_volume(runner: &dyn ProcessRunner, drive: &DriveHandle) -> Option<VolumeMetadata> {
    let output = match runner.capture(build_blkid_command(drive.path())) {
        Ok(output) => output,
        Err(e) => {
            debug!("blkid error: {}", e);
            return None;
        }
    };
    if output.is_empty() {
        debug!("No blkid output");
        return None;
    }

    debug!("blkid output: {}", output);
    let device = drive.path().to_string_lossy();
    parse_blkid(&output)
        .remove(&*device)
        .filter(|metadata| !metadata.is_empty())
}
