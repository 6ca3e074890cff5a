//! Preflight checks run before any recording is touched
//!
//! - Encoder availability: the configured FFmpeg program must run and
//!   report a parseable version, since split clip reconstruction and every
//!   transcode profile depend on it.

use std::process::Command;
use thiserror::Error;

/// Why the encoder check failed
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Encoder not available: {0}")]
    EncoderUnavailable(String),

    #[error("Could not determine encoder version: {0}")]
    UnknownVersion(String),
}

/// Major version from the first line of an `ffmpeg -version` banner,
/// `<program> version <release> ...`.
///
/// Git builds prefix the release with `n` (`n6.1-3-g1234567`).
pub fn parse_ffmpeg_version(banner: &str) -> Option<u32> {
    let mut words = banner.lines().next()?.split_whitespace();
    words.find(|word| word.eq_ignore_ascii_case("version"))?;
    let release = words.next()?.trim_start_matches(['n', 'N']);
    let digits = release
        .find(|c: char| !c.is_ascii_digit())
        .map_or(release, |end| &release[..end]);
    digits.parse().ok()
}

/// Runs `<program> -version` and returns the major version it reports.
pub fn check_encoder_available(program: &str) -> Result<u32, StartupError> {
    let output = Command::new(program).arg("-version").output().map_err(|e| {
        StartupError::EncoderUnavailable(format!(
            "{} -version failed; is FFmpeg installed and in PATH? Error: {}",
            program, e
        ))
    })?;

    if !output.status.success() {
        return Err(StartupError::EncoderUnavailable(format!(
            "{} -version exited with {}",
            program, output.status
        )));
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    parse_ffmpeg_version(&version_output).ok_or_else(|| {
        StartupError::UnknownVersion(format!(
            "unexpected output from {} -version: {}",
            program,
            version_output.lines().next().unwrap_or("(empty)")
        ))
    })
}
