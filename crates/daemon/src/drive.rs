//! Physical drive identity

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::commands::build_eject_command;
use crate::process::{ProcessError, ProcessRunner};

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Cannot derive a drive index from {0}; set drive.index explicitly")]
    NoIndex(PathBuf),
}

/// A physical optical device: its device path and the numeric index the
/// video extraction tool addresses it by. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveHandle {
    path: PathBuf,
    index: u32,
}

impl DriveHandle {
    /// Build a handle, deriving the index from the path's trailing digits
    /// (`/dev/sr1` -> 1) unless one is given.
    pub fn new(path: impl Into<PathBuf>, index: Option<u32>) -> Result<Self, DriveError> {
        let path = path.into();
        let index = match index {
            Some(index) => index,
            None => derive_index(&path).ok_or_else(|| DriveError::NoIndex(path.clone()))?,
        };
        Ok(Self { path, index })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Last path component, used to name the mount point (`sr0`)
    pub fn device_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("drive{}", self.index))
    }

    pub fn eject(&self, runner: &dyn ProcessRunner, use_sudo: bool) -> Result<(), ProcessError> {
        runner.capture(build_eject_command(&self.path, use_sudo)).map(|_| ())
    }
}

fn derive_index(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let digits_start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    name[digits_start..].parse().ok()
}
