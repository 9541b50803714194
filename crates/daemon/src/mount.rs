//! Mount manager: owns every mount point this process creates.
//!
//! Each successful [`MountManager::mount`] registers a record; the record is
//! released by [`MountManager::unmount`] or, at shutdown, by
//! [`MountManager::unmount_all`]. Records are removed before the unmount
//! attempt, so each mount gets exactly one attempt. Dropping the manager runs
//! `unmount_all` for anything still outstanding.
//!
//! A manager assumes it is the only one mounting its points; with several
//! drives use one manager per drive or share one behind a mutex.

use log::{debug, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::commands::{build_mount_command, build_umount_command};
use crate::drive::DriveHandle;
use crate::process::{ProcessError, ProcessRunner};

#[derive(Debug, Error)]
pub enum MountError {
    #[error("Failed to create mount point {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mount of {path} failed: {source}")]
    Mount {
        path: PathBuf,
        #[source]
        source: ProcessError,
    },

    #[error("{0} is already mounted by this process")]
    AlreadyMounted(PathBuf),
}

/// Proof of an active mount. Not cloneable: hand it back to
/// [`MountManager::unmount`] to release it.
#[derive(Debug, PartialEq, Eq)]
pub struct MountRecord {
    mount_point: PathBuf,
}

impl MountRecord {
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }
}

pub struct MountManager {
    runner: Arc<dyn ProcessRunner>,
    mount_root: PathBuf,
    use_sudo: bool,
    active: BTreeSet<PathBuf>,
}

impl MountManager {
    pub fn new(runner: Arc<dyn ProcessRunner>, mount_root: PathBuf, use_sudo: bool) -> Self {
        Self {
            runner,
            mount_root,
            use_sudo,
            active: BTreeSet::new(),
        }
    }

    /// Private mount point for a drive: `<mount_root>/<device name>`
    pub fn mount_point_for(&self, drive: &DriveHandle) -> PathBuf {
        self.mount_root.join(drive.device_name())
    }

    /// Mount the drive at its private mount point, creating the directory if needed.
    pub fn mount(&mut self, drive: &DriveHandle) -> Result<MountRecord, MountError> {
        let mount_point = self.mount_point_for(drive);
        if self.active.contains(&mount_point) {
            return Err(MountError::AlreadyMounted(mount_point));
        }

        fs::create_dir_all(&mount_point).map_err(|source| MountError::CreateDir {
            path: mount_point.clone(),
            source,
        })?;

        self.runner
            .capture(build_mount_command(drive.path(), &mount_point, self.use_sudo))
            .map_err(|source| MountError::Mount {
                path: mount_point.clone(),
                source,
            })?;

        debug!("Mounted {} at {}", drive.path().display(), mount_point.display());
        self.active.insert(mount_point.clone());
        Ok(MountRecord { mount_point })
    }

    /// Release one mount. Failures are logged; the record is gone either way.
    pub fn unmount(&mut self, record: MountRecord) {
        if self.active.remove(&record.mount_point) {
            self.unmount_point(&record.mount_point);
        }
    }

    /// Unmount every outstanding record. Safe to call repeatedly.
    pub fn unmount_all(&mut self) {
        for mount_point in std::mem::take(&mut self.active) {
            self.unmount_point(&mount_point);
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn unmount_point(&self, mount_point: &Path) {
        match self
            .runner
            .capture(build_umount_command(mount_point, self.use_sudo))
        {
            Ok(_) => debug!("Unmounted {}", mount_point.display()),
            Err(e) => warn!("Unmount of {} failed: {}", mount_point.display(), e),
        }
    }
}

impl Drop for MountManager {
    fn drop(&mut self) {
        self.unmount_all();
    }
}
