//! Safe copy of a single recording into the archive.
//!
//! The copy keeps the source's base name and modification time. In verify
//! mode the destination's metadata and fingerprint are checked against the
//! source before the copy counts as successful. The copier never touches the
//! ledger; the caller appends once the copy is confirmed.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use crate::fingerprint::{Fingerprint, Fingerprinter};

/// Errors that can occur while transferring one file.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Source file not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Permission denied: {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Metadata of {} differs from source after copy: {detail}", .path.display())]
    MetadataMismatch { path: PathBuf, detail: String },

    #[error("Content of {} differs from source after copy (expected {expected}, got {actual})", .path.display())]
    ContentMismatch {
        path: PathBuf,
        expected: Fingerprint,
        actual: Fingerprint,
    },

    #[error("Transfer failed: {0}")]
    Unknown(String),
}

impl TransferError {
    /// Maps an I/O error on `path` onto the transfer taxonomy.
    pub fn from_io(path: &Path, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => TransferError::SourceNotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => TransferError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => TransferError::Unknown(format!("{}: {}", path.display(), e)),
        }
    }
}

/// A confirmed copy in the destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Copied {
    /// Destination file, still carrying the source's base name.
    pub path: PathBuf,
    pub bytes: u64,
}

/// Copies recordings, optionally verifying each copy.
#[derive(Debug, Clone, Copy)]
pub struct SafeCopier {
    fingerprinter: Fingerprinter,
    verify: bool,
}

impl SafeCopier {
    pub fn new(fingerprinter: Fingerprinter, verify: bool) -> Self {
        Self {
            fingerprinter,
            verify,
        }
    }

    /// Copies `source` into `destination_dir`.
    ///
    /// 1. Creates `destination_dir` if missing
    /// 2. Copies bytes and modification time, keeping the base name
    /// 3. In verify mode compares size and mtime, then recomputes the
    ///    destination's fingerprint and compares it to `fingerprint`
    ///
    /// A copy that fails verification is removed from the destination.
    pub fn copy(
        &self,
        source: &Path,
        destination_dir: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<Copied, TransferError> {
        let source_meta = fs::metadata(source).map_err(|e| TransferError::from_io(source, e))?;
        let file_name = source
            .file_name()
            .ok_or_else(|| TransferError::Unknown(format!("{} has no file name", source.display())))?;

        fs::create_dir_all(destination_dir)
            .map_err(|e| TransferError::from_io(destination_dir, e))?;
        let destination = destination_dir.join(file_name);

        let bytes = fs::copy(source, &destination).map_err(|e| TransferError::from_io(source, e))?;
        let source_modified = source_meta
            .modified()
            .map_err(|e| TransferError::from_io(source, e))?;
        preserve_modified(&destination, source_modified)
            .map_err(|e| TransferError::from_io(&destination, e))?;

        debug!("Copied {} -> {}", source.display(), destination.display());

        if self.verify {
            if let Err(e) = self.verify_copy(&source_meta, &destination, fingerprint) {
                if let Err(remove_err) = fs::remove_file(&destination) {
                    warn!(
                        "Could not remove unverified copy {}: {}",
                        destination.display(),
                        remove_err
                    );
                }
                return Err(e);
            }
            debug!("Verified {}", destination.display());
        }

        Ok(Copied {
            path: destination,
            bytes,
        })
    }

    fn verify_copy(
        &self,
        source_meta: &fs::Metadata,
        destination: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<(), TransferError> {
        let dest_meta =
            fs::metadata(destination).map_err(|e| TransferError::from_io(destination, e))?;

        if dest_meta.len() != source_meta.len() {
            return Err(TransferError::MetadataMismatch {
                path: destination.to_path_buf(),
                detail: format!(
                    "size {} != source size {}",
                    dest_meta.len(),
                    source_meta.len()
                ),
            });
        }

        let source_secs = source_meta.modified().map(unix_secs).unwrap_or(0);
        let dest_secs = dest_meta.modified().map(unix_secs).unwrap_or(0);
        if source_secs != dest_secs {
            return Err(TransferError::MetadataMismatch {
                path: destination.to_path_buf(),
                detail: format!("mtime {} != source mtime {}", dest_secs, source_secs),
            });
        }

        let actual = self
            .fingerprinter
            .fingerprint_path(destination)
            .map_err(|e| TransferError::from_io(destination, e))?;
        if &actual != fingerprint {
            return Err(TransferError::ContentMismatch {
                path: destination.to_path_buf(),
                expected: fingerprint.clone(),
                actual,
            });
        }

        Ok(())
    }
}

/// Sets `path`'s modification time.
pub fn preserve_modified(path: &Path, modified: SystemTime) -> io::Result<()> {
    File::options().write(true).open(path)?.set_modified(modified)
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
