//! External tool invocations: stream-copy concatenation and per-profile encoding

pub mod concat;
pub mod ffmpeg;

pub use concat::{build_concat_command, ConcatenationError, Concatenator, FfmpegConcatenator};
pub use ffmpeg::{build_encode_command, EncodeError, EncodeParams, Encoder, FfmpegEncoder};

use std::process::{Command, ExitStatus, Stdio};

/// Maximum number of stderr lines kept in an error
const STDERR_TAIL_LINES: usize = 20;

/// Runs `cmd` to completion with stdin closed, capturing stderr.
pub(crate) fn run_capturing_stderr(cmd: &mut Command) -> std::io::Result<(ExitStatus, String)> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()?;
    Ok((output.status, stderr_tail(&output.stderr)))
}

/// Last lines of a tool's stderr, trimmed.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {}\n\n", i)).collect();
        let tail = stderr_tail(text.as_bytes());
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "line 10");
        assert_eq!(lines[STDERR_TAIL_LINES - 1], "line 29");
    }

    #[test]
    fn test_stderr_tail_empty() {
        assert_eq!(stderr_tail(b""), "");
    }
}
