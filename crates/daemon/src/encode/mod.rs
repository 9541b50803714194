//! Transcoding of staged video files

pub mod handbrake;

pub use handbrake::{build_handbrake_command, run_transcode, EncodeError, TranscodeParams};
