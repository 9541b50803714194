//! Filesystem moves between staging and output.
//!
//! Moves try a rename first and fall back to copy-then-delete when staging and
//! output live on different filesystems.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors that can occur while moving extracted content.
#[derive(Debug, Error)]
pub enum RelocateError {
    /// Destination already exists and must not be overwritten.
    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// Failed to copy into the destination.
    #[error("Failed to copy {from} to {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Copy succeeded but the source could not be removed.
    #[error("Failed to remove source {path}: {source}")]
    RemoveSourceFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Move a directory tree to `dest`, which must not exist yet.
///
/// If the copy fallback fails halfway the partial destination is removed and
/// the source is left untouched.
pub fn move_dir(src: &Path, dest: &Path) -> Result<(), RelocateError> {
    if dest.exists() {
        return Err(RelocateError::DestinationExists(dest.to_path_buf()));
    }

    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    if let Err(source) = copy_tree(src, dest) {
        let _ = fs::remove_dir_all(dest);
        return Err(RelocateError::CopyFailed {
            from: src.to_path_buf(),
            to: dest.to_path_buf(),
            source,
        });
    }

    fs::remove_dir_all(src).map_err(|source| RelocateError::RemoveSourceFailed {
        path: src.to_path_buf(),
        source,
    })
}

fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Replace `dir` with a fresh empty directory
pub fn reset_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}

/// Remove `dir` only if it exists and is empty. Returns whether it was removed.
pub fn remove_dir_if_empty(dir: &Path) -> io::Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Ok(false);
            }
            fs::remove_dir(dir)?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Path with `.partial` appended, where in-progress copies are written
pub fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    PathBuf::from(partial)
}
