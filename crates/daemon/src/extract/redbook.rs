use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use super::{io_err, redbook_staging_dir, ExtractError, ExtractOutcome, Extractor};
use crate::commands::build_abcde_command;
use crate::drive::DriveHandle;
use crate::fingerprint::ContentFingerprint;
use crate::relocate::{move_dir, reset_dir};

/// An output entry whose name ends with the fingerprint, if any.
///
/// Matching on the suffix keeps deduplication working when the album name
/// differs between rips of the same disc.
fn find_by_fingerprint(
    output_root: &Path,
    fingerprint: &ContentFingerprint,
) -> Result<Option<PathBuf>, ExtractError> {
    let entries = match fs::read_dir(output_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(output_root)(e)),
    };
    for entry in entries {
        let entry = entry.map_err(io_err(output_root))?;
        if entry
            .file_name()
            .to_string_lossy()
            .ends_with(fingerprint.as_str())
        {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// The single album directory the ripper leaves in staging
fn single_album_dir(staging: &Path) -> Result<PathBuf, ExtractError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(staging).map_err(io_err(staging))? {
        let entry = entry.map_err(io_err(staging))?;
        if entry.file_type().map_err(io_err(staging))?.is_dir() {
            dirs.push(entry.path());
        }
    }
    match dirs.len() {
        1 => Ok(dirs.remove(0)),
        found => Err(ExtractError::UnexpectedStaging {
            dir: staging.to_path_buf(),
            found,
        }),
    }
}

impl Extractor {
    /// Rip an audio disc and move the album to `<redbook_output>/<album>-<fingerprint>`.
    pub(super) fn extract_redbook(
        &self,
        drive: &DriveHandle,
        fingerprint: &ContentFingerprint,
    ) -> Result<ExtractOutcome, ExtractError> {
        let output_root = &self.paths.redbook_output;
        if let Some(existing) = find_by_fingerprint(output_root, fingerprint)? {
            info!("Audio disc {} already ingested at {}", fingerprint, existing.display());
            return Ok(ExtractOutcome::AlreadyPresent(existing));
        }

        let staging = redbook_staging_dir(&self.paths.staging_root);
        reset_dir(&staging).map_err(io_err(&staging))?;
        fs::create_dir_all(output_root).map_err(io_err(output_root))?;

        info!("Ripping audio disc {}", fingerprint);
        self.runner
            .stream(build_abcde_command(drive.path(), &staging))?;

        let album = single_album_dir(&staging)?;
        let album_name = album
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = output_root.join(format!("{}-{}", album_name, fingerprint));
        move_dir(&album, &dest)?;

        info!("Audio disc {} moved to {}", fingerprint, dest.display());
        Ok(ExtractOutcome::Completed(dest))
    }
}
