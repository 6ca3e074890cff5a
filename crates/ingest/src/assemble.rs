//! Split clip reconstruction.
//!
//! Camcorders cap the size of a single file, so a long recording is stored
//! as a run of files above the cap followed by one file at or below it. The
//! assembler is fed the not-yet-ingested recordings in recording order and
//! decides, per file, whether it is a standalone clip, part of a pending
//! group, or the part that closes a group.
//!
//! A run of oversized files at the end of the input is never closed and is
//! neither copied nor ledgered in that run. It is reported back through
//! [`SplitClipAssembler::finish`].
//!
//! A part that cannot be read breaks its recording: the whole group is
//! abandoned through its closing part so a truncated clip is never joined.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::copy::preserve_modified;
use crate::encode::{ConcatenationError, Concatenator};
use crate::fingerprint::Fingerprint;
use crate::naming::canonical_target;
use crate::source::SourceFile;

/// A recording paired with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipPart {
    pub source: SourceFile,
    pub fingerprint: Fingerprint,
}

/// What to do with the part just offered to the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Copy and rename this part on its own.
    Standalone(ClipPart),
    /// The part joined the pending group; nothing to do yet.
    Accumulated,
    /// The part closed the group; concatenate these parts in order.
    Flush(Vec<ClipPart>),
    /// The part belongs to a group abandoned after a failed part.
    Abandoned(ClipPart),
}

/// Idle while `pending` is empty, accumulating otherwise.
///
/// After [`abandon`](SplitClipAssembler::abandon) on an oversized part the
/// assembler discards offered parts up to and including the next part at or
/// below the threshold.
#[derive(Debug)]
pub struct SplitClipAssembler {
    threshold_bytes: u64,
    pending: Vec<ClipPart>,
    discarding: bool,
}

impl SplitClipAssembler {
    pub fn new(threshold_bytes: u64) -> Self {
        Self {
            threshold_bytes,
            pending: Vec::new(),
            discarding: false,
        }
    }

    pub fn is_accumulating(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Classifies the next part in recording order.
    pub fn offer(&mut self, part: ClipPart) -> Classification {
        if self.discarding {
            if part.source.size_bytes <= self.threshold_bytes {
                self.discarding = false;
            }
            return Classification::Abandoned(part);
        }

        if part.source.size_bytes > self.threshold_bytes {
            self.pending.push(part);
            return Classification::Accumulated;
        }

        if self.pending.is_empty() {
            return Classification::Standalone(part);
        }

        self.pending.push(part);
        Classification::Flush(std::mem::take(&mut self.pending))
    }

    /// Gives up on the group a part of `failed_size` bytes could not join.
    ///
    /// Returns the pending parts, which must not be transferred or ledgered.
    /// An undersized failed part closes the group; an oversized one leaves
    /// the rest of its recording to be discarded by [`offer`](Self::offer).
    /// Idle with an undersized failed part, nothing is abandoned.
    pub fn abandon(&mut self, failed_size: u64) -> Vec<ClipPart> {
        if failed_size > self.threshold_bytes {
            self.discarding = true;
        }
        std::mem::take(&mut self.pending)
    }

    /// Ends the input, returning the unclosed trailing group (usually empty).
    pub fn finish(self) -> Vec<ClipPart> {
        self.pending
    }
}

/// Concatenates a closed group into `destination_dir`.
///
/// The output is named after the last part's modification time, using the
/// same collision policy as standalone clips, and takes that part's
/// modification time. A partial output is removed on failure.
pub fn reconstruct(
    group: &[ClipPart],
    destination_dir: &Path,
    concatenator: &dyn Concatenator,
) -> Result<PathBuf, ConcatenationError> {
    let last = group.last().ok_or(ConcatenationError::EmptyGroup)?;
    let target = canonical_target(
        destination_dir,
        last.source.modified_time,
        last.source.path.extension(),
        None,
    );
    let inputs: Vec<PathBuf> = group.iter().map(|p| p.source.path.clone()).collect();

    info!(
        "Concatenating {} parts ({} .. {}) into {}",
        inputs.len(),
        group[0].source.name(),
        last.source.name(),
        target.display()
    );

    if let Err(e) = concatenator.concatenate(&inputs, &target) {
        if target.exists() {
            if let Err(remove_err) = fs::remove_file(&target) {
                warn!(
                    "Could not remove partial output {}: {}",
                    target.display(),
                    remove_err
                );
            }
        }
        return Err(e);
    }

    if let Err(e) = preserve_modified(&target, last.source.modified_time) {
        warn!("Could not set modification time of {}: {}", target.display(), e);
    }

    Ok(target)
}
