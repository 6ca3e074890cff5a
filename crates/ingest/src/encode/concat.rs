//! Stream-copy concatenation of split recordings
//!
//! AVCHD `.MTS` files are MPEG transport streams, so the parts of a split
//! clip can be joined byte-accurately with FFmpeg's `concat:` protocol and
//! `-c copy`, without re-encoding.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use super::run_capturing_stderr;

/// Error type for concatenation
#[derive(Debug, Error)]
pub enum ConcatenationError {
    /// Concatenation process exited with non-zero status
    #[error("Concatenation failed with exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    /// Concatenation process was terminated by signal
    #[error("Concatenation process was terminated by signal: {stderr}")]
    Terminated { stderr: String },

    /// Nothing to concatenate
    #[error("Split group is empty")]
    EmptyGroup,

    /// IO error starting the tool
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Joins an ordered list of inputs into one output by stream copy.
///
/// Calls block until the output is complete.
pub trait Concatenator: Send + Sync {
    fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ConcatenationError>;
}

/// Concatenator backed by an `ffmpeg` executable
#[derive(Debug, Clone)]
pub struct FfmpegConcatenator {
    program: String,
}

impl FfmpegConcatenator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Concatenator for FfmpegConcatenator {
    fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ConcatenationError> {
        if inputs.is_empty() {
            return Err(ConcatenationError::EmptyGroup);
        }

        let mut cmd = build_concat_command(&self.program, inputs, output);
        let (status, stderr) = run_capturing_stderr(&mut cmd)?;

        if status.success() {
            Ok(())
        } else {
            match status.code() {
                Some(code) => Err(ConcatenationError::NonZeroExit { code, stderr }),
                None => Err(ConcatenationError::Terminated { stderr }),
            }
        }
    }
}

/// `concat:` protocol URL joining `inputs` in order
pub fn concat_url(inputs: &[PathBuf]) -> String {
    let joined = inputs
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("|");
    format!("concat:{}", joined)
}

/// Build the concatenation command
///
/// Never overwrites (`-n`): the caller picks a free output name.
pub fn build_concat_command(program: &str, inputs: &[PathBuf], output: &Path) -> Command {
    let mut cmd = Command::new(program);

    cmd.arg("-hide_banner").arg("-loglevel").arg("error").arg("-n");
    cmd.arg("-i").arg(concat_url(inputs));
    cmd.arg("-map").arg("0");
    cmd.arg("-c").arg("copy");
    cmd.arg(output);

    cmd
}
