//! Scanner for files waiting in video staging.
//!
//! Staging holds one directory per disc identity, `<staging>/<identity>/`,
//! with the extracted title files directly inside it. Hidden entries are
//! never candidates; that covers the completion sentinel.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Written into an identity directory once extraction finished successfully
pub const SENTINEL_NAME: &str = ".extracted";

/// A staged file discovered during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Name of the identity directory the file sits in.
    pub identity: String,
    pub path: PathBuf,
    /// Size in bytes at discovery time.
    pub size_bytes: u64,
}

impl StagedFile {
    /// The identity directory holding this file
    pub fn entry_dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|n| n.starts_with('.')).unwrap_or(false)
}

/// Whether extraction into `entry_dir` has completed
pub fn has_sentinel(entry_dir: &Path) -> bool {
    entry_dir.join(SENTINEL_NAME).is_file()
}

/// Mark `entry_dir` as fully extracted
pub fn write_sentinel(entry_dir: &Path) -> std::io::Result<()> {
    fs::write(entry_dir.join(SENTINEL_NAME), b"")
}

/// List regular files at `<staging_root>/<identity>/<file>`.
///
/// A missing staging root yields nothing. Results are sorted by path.
pub fn scan_staging(staging_root: &Path) -> Vec<StagedFile> {
    if !staging_root.exists() {
        return Vec::new();
    }

    let walker = WalkDir::new(staging_root)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        // the root itself may be hidden, only what is beneath it is filtered
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    let mut staged = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if entry.depth() != 2 || !entry.file_type().is_file() {
            continue;
        }
        let Some(identity) = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
        else {
            continue;
        };
        if let Ok(metadata) = entry.metadata() {
            staged.push(StagedFile {
                identity: identity.to_string(),
                path: entry.path().to_path_buf(),
                size_bytes: metadata.len(),
            });
        }
    }
    staged
}

/// Identity directories directly under the staging root
pub fn entry_dirs(staging_root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(staging_root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| !is_hidden(&e.file_name()))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs
}
