//! Stage 2: transcode the clips ingested in this run.
//!
//! Every enabled profile gets its own worker, and the workers run
//! concurrently. Within a worker the clips are encoded one after another in
//! the order they were ingested. A failed encode is logged and the worker
//! moves on to the next clip; it never affects the other profiles.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::TranscodeProfile;
use crate::encode::{EncodeError, EncodeParams, Encoder};
use crate::progress::{percent, publish, ClipOutcome, ProgressEvent, ProgressSender};

/// Directory next to the archived clips that holds every profile's folder
pub const TRANSCODED_DIR: &str = "transcoded";

/// One clip a profile could not encode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipFailure {
    pub clip: PathBuf,
    pub reason: String,
}

/// What one profile worker did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub profile_id: String,
    pub encoded: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<ClipFailure>,
}

/// Result of a transcode run, one entry per enabled profile in config order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranscodeSummary {
    pub profiles: Vec<ProfileSummary>,
}

impl TranscodeSummary {
    pub fn has_failures(&self) -> bool {
        self.profiles.iter().any(|p| !p.failed.is_empty())
    }

    pub fn total_encoded(&self) -> usize {
        self.profiles.iter().map(|p| p.encoded.len()).sum()
    }
}

/// Output location of `clip` for `profile`:
/// `<clip dir>/transcoded/<folder>/<stem><suffix>.<container>`.
pub fn output_path(clip: &Path, profile: &TranscodeProfile) -> PathBuf {
    let dir = clip.parent().unwrap_or_else(|| Path::new(""));
    let stem = clip
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(TRANSCODED_DIR)
        .join(&profile.folder)
        .join(format!("{}{}.{}", stem, profile.suffix, profile.container))
}

/// Fans the ingested clips out to one worker per enabled profile.
pub struct TranscodeOrchestrator {
    encoder: Arc<dyn Encoder>,
}

impl TranscodeOrchestrator {
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self { encoder }
    }

    /// Runs every enabled profile over `clips` and waits for all of them.
    ///
    /// Disabled profiles are ignored. Returns once every worker has finished.
    pub async fn run(
        &self,
        clips: &[PathBuf],
        profiles: &[TranscodeProfile],
        overwrite: bool,
        progress: ProgressSender,
    ) -> TranscodeSummary {
        let clips: Arc<[PathBuf]> = clips.into();
        let mut workers = JoinSet::new();

        for (index, profile) in profiles.iter().filter(|p| p.enabled).enumerate() {
            let worker = ProfileWorker {
                profile: profile.clone(),
                encoder: Arc::clone(&self.encoder),
                overwrite,
                progress: progress.clone(),
            };
            let clips = Arc::clone(&clips);
            info!(
                "Starting profile {} ({} clips -> {}/{})",
                profile.id,
                clips.len(),
                TRANSCODED_DIR,
                profile.folder
            );
            workers.spawn(async move { (index, worker.run(&clips).await) });
        }
        drop(progress);

        let mut finished = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(entry) => finished.push(entry),
                Err(e) => error!("Profile worker aborted: {}", e),
            }
        }
        finished.sort_by_key(|(index, _)| *index);

        TranscodeSummary {
            profiles: finished.into_iter().map(|(_, summary)| summary).collect(),
        }
    }
}

struct ProfileWorker {
    profile: TranscodeProfile,
    encoder: Arc<dyn Encoder>,
    overwrite: bool,
    progress: ProgressSender,
}

impl ProfileWorker {
    async fn run(self, clips: &[PathBuf]) -> ProfileSummary {
        let mut summary = ProfileSummary {
            profile_id: self.profile.id.clone(),
            ..Default::default()
        };
        let total = clips.len();

        for (index, clip) in clips.iter().enumerate() {
            let outcome = self.transcode(clip).await;
            match &outcome {
                ClipOutcome::Encoded { output } => {
                    info!("[{}] Encoded {}", self.profile.id, output.display());
                    summary.encoded.push(output.clone());
                }
                ClipOutcome::Skipped { output } => {
                    info!(
                        "[{}] Skipping {}: output already exists",
                        self.profile.id,
                        output.display()
                    );
                    summary.skipped.push(output.clone());
                }
                ClipOutcome::Failed { reason } => {
                    error!(
                        "[{}] Failed to encode {}: {}",
                        self.profile.id,
                        clip.display(),
                        reason
                    );
                    summary.failed.push(ClipFailure {
                        clip: clip.clone(),
                        reason: reason.clone(),
                    });
                }
            }

            publish(
                &self.progress,
                ProgressEvent::Transcode {
                    profile_id: self.profile.id.clone(),
                    clip: clip.clone(),
                    processed: index + 1,
                    total,
                    percent: percent(index + 1, total),
                    outcome,
                },
            );
        }

        info!(
            "[{}] Finished: {} encoded, {} skipped, {} failed",
            self.profile.id,
            summary.encoded.len(),
            summary.skipped.len(),
            summary.failed.len()
        );
        summary
    }

    async fn transcode(&self, clip: &Path) -> ClipOutcome {
        let output = output_path(clip, &self.profile);
        if !self.overwrite && output.exists() {
            return ClipOutcome::Skipped { output };
        }

        let params = EncodeParams {
            input_path: clip.to_path_buf(),
            output_path: output.clone(),
            codec: self.profile.codec,
            quality: self.profile.quality.clone(),
            overwrite: self.overwrite,
        };
        let encoder = Arc::clone(&self.encoder);

        let result = tokio::task::spawn_blocking(move || -> Result<(), EncodeError> {
            if let Some(dir) = params.output_path.parent() {
                fs::create_dir_all(dir)?;
            }
            encoder.encode(&params)
        })
        .await;

        match result {
            Ok(Ok(())) => ClipOutcome::Encoded { output },
            Ok(Err(e)) => {
                remove_partial(&output);
                ClipOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(e) => ClipOutcome::Failed {
                reason: format!("encode task panicked: {}", e),
            },
        }
    }
}

fn remove_partial(output: &Path) {
    if output.exists() {
        if let Err(e) = fs::remove_file(output) {
            warn!("Could not remove partial output {}: {}", output.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Quality, VideoCodec};
    use crate::progress::progress_channel;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Encoder that writes the input name to the output and records calls.
    #[derive(Default)]
    struct RecordingEncoder {
        calls: Mutex<Vec<EncodeParams>>,
        failing_inputs: HashSet<PathBuf>,
    }

    impl Encoder for RecordingEncoder {
        fn encode(&self, params: &EncodeParams) -> Result<(), EncodeError> {
            self.calls.lock().unwrap().push(params.clone());
            if self.failing_inputs.contains(&params.input_path) {
                fs::write(&params.output_path, b"partial")?;
                return Err(EncodeError::NonZeroExit {
                    code: 1,
                    stderr: "Conversion failed!".to_string(),
                });
            }
            fs::write(&params.output_path, params.input_path.to_string_lossy().as_bytes())?;
            Ok(())
        }
    }

    fn profile(id: &str, enabled: bool) -> TranscodeProfile {
        let mut p = TranscodeProfile::new(id, VideoCodec::H264, Quality::Bitrate("4M".into()), "_x");
        p.enabled = enabled;
        p
    }

    fn clips(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                fs::write(&path, b"clip").unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_output_path_layout() {
        let mut p = TranscodeProfile::new("H265_VBR", VideoCodec::H265, Quality::Crf(23), "_crf");
        p.folder = "hevc".to_string();
        let out = output_path(Path::new("/archive/2020-09-13_12-26-40.MTS"), &p);
        assert_eq!(
            out,
            PathBuf::from("/archive/transcoded/hevc/2020-09-13_12-26-40_crf.mp4")
        );
    }

    #[tokio::test]
    async fn test_every_enabled_profile_encodes_every_clip() {
        let temp = TempDir::new().unwrap();
        let clips = clips(temp.path(), &["a.MTS", "b.MTS"]);
        let encoder = Arc::new(RecordingEncoder::default());
        let orchestrator = TranscodeOrchestrator::new(encoder.clone());
        let profiles = vec![profile("low", true), profile("off", false), profile("high", true)];
        let (tx, mut rx) = progress_channel();

        let summary = orchestrator.run(&clips, &profiles, false, tx).await;

        let ids: Vec<&str> = summary.profiles.iter().map(|p| p.profile_id.as_str()).collect();
        assert_eq!(ids, vec!["low", "high"]);
        assert_eq!(summary.total_encoded(), 4);
        assert!(!summary.has_failures());
        assert_eq!(encoder.calls.lock().unwrap().len(), 4);
        assert!(temp.path().join("transcoded/low/a_x.mp4").exists());
        assert!(temp.path().join("transcoded/high/b_x.mp4").exists());
        assert!(!temp.path().join("transcoded/off").exists());

        let mut events = 0;
        while rx.recv().await.is_some() {
            events += 1;
        }
        assert_eq!(events, 4);
    }

    #[tokio::test]
    async fn test_existing_output_is_skipped_without_overwrite() {
        let temp = TempDir::new().unwrap();
        let clips = clips(temp.path(), &["a.MTS"]);
        let p = profile("low", true);
        let existing = output_path(&clips[0], &p);
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"keep me").unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let (tx, _rx) = progress_channel();

        let summary = TranscodeOrchestrator::new(encoder.clone())
            .run(&clips, &[p], false, tx)
            .await;

        assert_eq!(summary.profiles[0].skipped, vec![existing.clone()]);
        assert!(encoder.calls.lock().unwrap().is_empty());
        assert_eq!(fs::read(&existing).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_existing_output() {
        let temp = TempDir::new().unwrap();
        let clips = clips(temp.path(), &["a.MTS"]);
        let p = profile("low", true);
        let existing = output_path(&clips[0], &p);
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"old").unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let (tx, _rx) = progress_channel();

        let summary = TranscodeOrchestrator::new(encoder.clone())
            .run(&clips, &[p], true, tx)
            .await;

        assert_eq!(summary.profiles[0].encoded, vec![existing]);
        assert!(encoder.calls.lock().unwrap()[0].overwrite);
    }

    #[tokio::test]
    async fn test_failed_clip_does_not_stop_profile() {
        let temp = TempDir::new().unwrap();
        let clips = clips(temp.path(), &["a.MTS", "b.MTS", "c.MTS"]);
        let encoder = Arc::new(RecordingEncoder {
            failing_inputs: HashSet::from([clips[1].clone()]),
            ..Default::default()
        });
        let (tx, _rx) = progress_channel();

        let summary = TranscodeOrchestrator::new(encoder.clone())
            .run(&clips, &[profile("low", true), profile("high", true)], false, tx)
            .await;

        for p in &summary.profiles {
            assert_eq!(p.encoded.len(), 2);
            assert_eq!(p.failed.len(), 1);
            assert_eq!(p.failed[0].clip, clips[1]);
            assert!(p.failed[0].reason.contains("exit code 1"));
        }
        assert!(summary.has_failures());
        assert!(!temp.path().join("transcoded/low/b_x.mp4").exists());

        // Each worker encodes in ingest order
        let calls = encoder.calls.lock().unwrap();
        let low: Vec<&PathBuf> = calls
            .iter()
            .filter(|c| c.output_path.starts_with(temp.path().join("transcoded/low")))
            .map(|c| &c.input_path)
            .collect();
        assert_eq!(low, clips.iter().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_no_clips_finishes_immediately() {
        let (tx, _rx) = progress_channel();
        let summary = TranscodeOrchestrator::new(Arc::new(RecordingEncoder::default()))
            .run(&[], &[profile("low", true)], false, tx)
            .await;
        assert_eq!(summary.profiles.len(), 1);
        assert_eq!(summary.total_encoded(), 0);
    }
}
