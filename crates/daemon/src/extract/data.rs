use log::{info, warn};
use std::fs;

use super::{io_err, ExtractError, ExtractOutcome, Extractor};
use crate::commands::build_dd_command;
use crate::drive::DriveHandle;
use crate::probe::VolumeMetadata;
use crate::relocate::partial_path;

impl Extractor {
    /// Copy the raw device to `<iso_output>/<identity>.iso`.
    ///
    /// The copy lands in a `.partial` file first; only a finished copy is
    /// renamed into place, so an existing image is always complete.
    pub(super) fn extract_data(
        &self,
        drive: &DriveHandle,
        metadata: &VolumeMetadata,
    ) -> Result<ExtractOutcome, ExtractError> {
        let identity = metadata.identity()?;
        let output_root = &self.paths.iso_output;
        let image = output_root.join(format!("{}.iso", identity));
        if image.exists() {
            info!("Data disc {} already imaged at {}", identity, image.display());
            return Ok(ExtractOutcome::AlreadyPresent(image));
        }

        fs::create_dir_all(output_root).map_err(io_err(output_root))?;
        let partial = partial_path(&image);

        info!("Imaging data disc {} to {}", identity, image.display());
        if let Err(e) = self.runner.stream(build_dd_command(drive.path(), &partial)) {
            if let Err(rm) = fs::remove_file(&partial) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", partial.display(), rm);
                }
            }
            return Err(e.into());
        }

        fs::rename(&partial, &image).map_err(io_err(&image))?;
        Ok(ExtractOutcome::Completed(image))
    }
}
