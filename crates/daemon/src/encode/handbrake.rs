//! HandBrake transcoder
//!
//! Turns one staged title file into an H.264 MP4 with fixed quality settings.

use crate::process::{ProcessError, ProcessRunner};
use crate::relocate::partial_path;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Constant-quality factor for x264
const VIDEO_QUALITY: &str = "20";

/// Audio bitrate in kbps
const AUDIO_BITRATE: &str = "256";

/// Extension of transcoded outputs
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Error type for transcode operations
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Transcoder failed: {0}")]
    Tool(#[from] ProcessError),

    #[error("Failed to prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move finished transcode to {path}: {source}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One transcode job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeParams {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl TranscodeParams {
    /// Output for `input_path` is `<output_dir>/<stem>.mp4`
    pub fn for_staged_file(input_path: &Path, output_dir: &Path) -> Self {
        let stem = input_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| input_path.as_os_str().to_os_string());
        let mut output_path = output_dir.join(stem);
        output_path.set_extension(OUTPUT_EXTENSION);
        Self {
            input_path: input_path.to_path_buf(),
            output_path,
        }
    }

    /// Where the transcoder writes until it exits successfully
    pub fn partial_output(&self) -> PathBuf {
        partial_path(&self.output_path)
    }
}

/// `HandBrakeCLI -i <src> -o <dst>.partial -f av_mp4 -e x264 -q 20 -B 256`
///
/// The container is named explicitly since the `.partial` suffix hides it.
pub fn build_handbrake_command(params: &TranscodeParams) -> Command {
    let mut cmd = Command::new("HandBrakeCLI");
    cmd.arg("-i").arg(&params.input_path);
    cmd.arg("-o").arg(params.partial_output());
    cmd.arg("-f").arg("av_mp4");
    cmd.arg("-e").arg("x264");
    cmd.arg("-q").arg(VIDEO_QUALITY);
    cmd.arg("-B").arg(AUDIO_BITRATE);
    cmd
}

/// Transcode one file, creating the output directory first.
///
/// The transcoder writes to a `.partial` file that is renamed onto the
/// destination only after a clean exit, so the destination only ever exists
/// for a completed transcode, even if the process is killed halfway.
pub fn run_transcode(runner: &dyn ProcessRunner, params: &TranscodeParams) -> Result<(), EncodeError> {
    if let Some(dir) = params.output_path.parent() {
        fs::create_dir_all(dir).map_err(|source| EncodeError::OutputDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let partial = params.partial_output();
    // leftover from a transcode that was killed
    let _ = fs::remove_file(&partial);

    if let Err(e) = runner.stream(build_handbrake_command(params)) {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }

    fs::rename(&partial, &params.output_path).map_err(|source| EncodeError::Finalize {
        path: params.output_path.clone(),
        source,
    })
}
