use log::{info, warn};
use std::fs;

use super::{dvd_staging_root, io_err, ExtractError, ExtractOutcome, Extractor};
use crate::commands::build_makemkv_command;
use crate::drive::DriveHandle;
use crate::probe::VolumeMetadata;
use crate::relocate::{remove_dir_if_empty, reset_dir};
use crate::scan::write_sentinel;

impl Extractor {
    /// Rip every title into `<staging>/dvd/<identity>` and return without
    /// waiting for the transcode.
    pub(super) fn extract_dvd(
        &self,
        drive: &DriveHandle,
        metadata: &VolumeMetadata,
    ) -> Result<ExtractOutcome, ExtractError> {
        let identity = metadata.identity()?;
        let output_dir = self.paths.dvd_output.join(&identity);
        if output_dir.exists() {
            info!("DVD {} already ingested at {}", identity, output_dir.display());
            return Ok(ExtractOutcome::AlreadyPresent(output_dir));
        }

        let staging = dvd_staging_root(&self.paths.staging_root).join(&identity);
        reset_dir(&staging).map_err(io_err(&staging))?;
        fs::create_dir_all(&output_dir).map_err(io_err(&output_dir))?;

        if let Some(refresher) = &self.key_refresher {
            if let Err(e) = refresher.refresh() {
                warn!("Key refresh failed, extracting anyway: {}", e);
            }
        }

        info!("Ripping DVD {} into {}", identity, staging.display());
        if let Err(e) = self
            .runner
            .stream(build_makemkv_command(drive.index(), &staging))
        {
            // partial titles must not reach the watcher
            if let Err(rm) = fs::remove_dir_all(&staging) {
                warn!("Failed to clear staging {}: {}", staging.display(), rm);
            }
            if let Err(rm) = remove_dir_if_empty(&output_dir) {
                warn!("Failed to remove {}: {}", output_dir.display(), rm);
            }
            return Err(e.into());
        }

        write_sentinel(&staging).map_err(io_err(&staging))?;
        info!("DVD {} staged for transcoding", identity);
        Ok(ExtractOutcome::Staged(staging))
    }
}
