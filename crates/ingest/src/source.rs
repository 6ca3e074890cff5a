//! Source enumeration for recordings on the camcorder.
//!
//! Lists the recordings directly inside the stream directory, filtered by
//! extension, and returns them in recording order so the split-clip
//! assembler can rely on adjacency.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

/// A recording found on the source device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Full path to the recording.
    pub path: PathBuf,
    /// File size in bytes at enumeration time.
    pub size_bytes: u64,
    /// Last modified time of the file.
    pub modified_time: SystemTime,
}

impl SourceFile {
    /// Reads size and modification time for `path`.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            modified_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    /// Base name for log lines.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Checks if a file has the given extension (case-insensitive, with or without dot).
pub fn has_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

/// Enumerates the recordings in `directory`.
///
/// This function:
/// - Looks only at regular files directly inside the directory, following symlinks
/// - Skips hidden files (names starting with `.`, e.g. `._00001.MTS` resource forks)
/// - Filters by extension (case-insensitive)
/// - Returns the files sorted by file name, which on AVCHD devices is recording order
///
/// A missing directory yields an empty list.
pub fn enumerate_sources(directory: &Path, extension: &str) -> Vec<SourceFile> {
    if !directory.is_dir() {
        warn!(
            "Source directory {} does not exist or is not a directory",
            directory.display()
        );
        return Vec::new();
    }

    let walker = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    let mut sources = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", directory.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let hidden = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }

        let path = entry.path();
        if !has_extension(path, extension) {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => sources.push(SourceFile {
                path: path.to_path_buf(),
                size_bytes: metadata.len(),
                modified_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            }),
            Err(e) => warn!("Cannot read metadata of {}: {}", path.display(), e),
        }
    }

    sources
}
