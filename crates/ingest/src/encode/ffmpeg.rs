//! FFmpeg encoder for transcode profiles
//!
//! Builds and executes one encode per (clip, profile) pair: deinterlace,
//! re-encode video with the profile's codec and rate control, copy audio.

use crate::config::{Quality, VideoCodec};
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

use super::run_capturing_stderr;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder process exited with non-zero status
    #[error("Encoder failed with exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    /// Encoder process was terminated by signal
    #[error("Encoder process was terminated by signal: {stderr}")]
    Terminated { stderr: String },

    /// IO error starting the encoder or preparing its output directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters for a single encode
#[derive(Debug, Clone)]
pub struct EncodeParams {
    /// Path to the input clip
    pub input_path: PathBuf,
    /// Path for the encoded output file
    pub output_path: PathBuf,
    pub codec: VideoCodec,
    pub quality: Quality,
    /// Replace an existing output instead of refusing to write
    pub overwrite: bool,
}

/// Something that can encode one clip for one profile.
///
/// Calls block until the encode has finished.
pub trait Encoder: Send + Sync {
    fn encode(&self, params: &EncodeParams) -> Result<(), EncodeError>;
}

/// Encoder backed by an `ffmpeg` executable
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
    deinterlace_filter: String,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>, deinterlace_filter: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            deinterlace_filter: deinterlace_filter.into(),
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, params: &EncodeParams) -> Result<(), EncodeError> {
        let mut cmd = build_encode_command(&self.program, &self.deinterlace_filter, params);
        let (status, stderr) = run_capturing_stderr(&mut cmd)?;

        if status.success() {
            Ok(())
        } else {
            match status.code() {
                Some(code) => Err(EncodeError::NonZeroExit { code, stderr }),
                None => Err(EncodeError::Terminated { stderr }),
            }
        }
    }
}

/// Build an encoder command with all required flags
///
/// Creates a Command configured with:
/// - Overwrite policy (`-y` or `-n`)
/// - Input path
/// - Deinterlace filter
/// - Video codec and its bitrate or CRF
/// - Audio stream copy
/// - Output path
pub fn build_encode_command(program: &str, deinterlace_filter: &str, params: &EncodeParams) -> Command {
    let mut cmd = Command::new(program);

    cmd.arg("-hide_banner").arg("-loglevel").arg("error");
    cmd.arg(if params.overwrite { "-y" } else { "-n" });

    cmd.arg("-i").arg(&params.input_path);
    cmd.arg("-vf").arg(deinterlace_filter);
    cmd.arg("-c:v").arg(params.codec.encoder_name());

    match &params.quality {
        Quality::Bitrate(rate) => {
            cmd.arg("-b:v").arg(rate);
        }
        Quality::Crf(crf) => {
            cmd.arg("-crf").arg(crf.to_string());
        }
    }

    cmd.arg("-c:a").arg("copy");
    cmd.arg(&params.output_path);

    cmd
}
