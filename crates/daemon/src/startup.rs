//! Startup checks for the disc ingestion daemon
//!
//! Preflight checks run before either loop starts:
//! - every external tool the workflows invoke is on PATH
//! - the configured drive device exists
//! - staging, output and mount roots exist (created if missing)

use crate::config::Config;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tools invoked by probing, extraction and transcoding
const WORKFLOW_TOOLS: &[&str] = &[
    "blkid",
    "cdparanoia",
    "makemkvcon",
    "abcde",
    "dd",
    "HandBrakeCLI",
];

/// Tools invoked for mount management and eject
const DEVICE_TOOLS: &[&str] = &["mount", "umount", "eject"];

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Required tool not found in PATH: {tool}")]
    ToolMissing { tool: String },

    #[error("Drive device {0} does not exist")]
    DriveMissing(PathBuf),

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tools this configuration will invoke
pub fn required_tools(cfg: &Config) -> Vec<&'static str> {
    let mut tools: Vec<&'static str> = WORKFLOW_TOOLS.to_vec();
    tools.extend_from_slice(DEVICE_TOOLS);
    if cfg.drive.use_sudo {
        tools.push("sudo");
    }
    tools
}

/// Fail on the first tool that cannot be resolved on PATH
pub fn check_tools(tools: &[&str]) -> Result<(), StartupError> {
    for tool in tools {
        which::which(tool).map_err(|_| StartupError::ToolMissing {
            tool: tool.to_string(),
        })?;
    }
    Ok(())
}

pub fn check_drive_present(drive: &Path) -> Result<(), StartupError> {
    if drive.exists() {
        Ok(())
    } else {
        Err(StartupError::DriveMissing(drive.to_path_buf()))
    }
}

/// Create the staging, output and mount roots
pub fn prepare_directories(cfg: &Config) -> Result<(), StartupError> {
    let dirs = [
        &cfg.paths.staging_root,
        &cfg.paths.dvd_output,
        &cfg.paths.redbook_output,
        &cfg.paths.iso_output,
        &cfg.paths.bluray_output,
        &cfg.drive.mount_root,
    ];
    for dir in dirs {
        fs::create_dir_all(dir).map_err(|source| StartupError::CreateDir {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Run all startup checks in order: tools, drive, directories
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_tools(&required_tools(cfg))?;
    check_drive_present(&cfg.drive.path)?;
    prepare_directories(cfg)?;
    Ok(())
}
