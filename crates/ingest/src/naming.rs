//! Canonical, collision-free names for archived clips.
//!
//! A clip is named after its modification time, `YYYY-MM-DD_HH-MM-SS`, in
//! local time with the original extension. When that name is taken the
//! first free `_1`, `_2`, ... suffix is used.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};

/// Timestamp layout used for canonical names (second resolution)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Formats a modification time as a canonical base name.
pub fn format_timestamp(modified: SystemTime) -> String {
    DateTime::<Local>::from(modified)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

fn candidate_name(stem: &str, index: u32, extension: Option<&OsStr>) -> String {
    let mut name = if index == 0 {
        stem.to_string()
    } else {
        format!("{}_{}", stem, index)
    };
    if let Some(ext) = extension {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    name
}

/// Resolves the first free canonical path in `directory`.
///
/// `owner` is a file that may already occupy one of the candidate names; it
/// counts as free so renaming a file onto its own name is a no-op.
pub fn canonical_target(
    directory: &Path,
    modified: SystemTime,
    extension: Option<&OsStr>,
    owner: Option<&Path>,
) -> PathBuf {
    let stem = format_timestamp(modified);
    let mut index = 0u32;
    loop {
        let candidate = directory.join(candidate_name(&stem, index, extension));
        if !candidate.exists() || owner == Some(candidate.as_path()) {
            return candidate;
        }
        index += 1;
    }
}

/// Renames a freshly copied file in place to its canonical name.
///
/// Returns the new path, which becomes the clip's archive path.
pub fn rename_to_canonical(copied: &Path, destination_dir: &Path) -> io::Result<PathBuf> {
    let modified = fs::metadata(copied)?.modified()?;
    let target = canonical_target(destination_dir, modified, copied.extension(), Some(copied));

    if target != copied {
        fs::rename(copied, &target)?;
    }
    Ok(target)
}
