//! Progress reporting for both pipeline stages.
//!
//! Producers (the ingest thread and every profile worker) publish
//! [`ProgressEvent`]s on an unbounded channel; sending never blocks. A single
//! consumer task owns the [`ProgressBoard`] so no caller state is mutated
//! from worker threads.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// How one source file was resolved during ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Fingerprint already in the ledger
    AlreadyIngested,
    /// Copied and renamed as a standalone clip
    Copied { clip: PathBuf },
    /// Held as part of a split group
    Accumulated,
    /// Closed a split group, which was concatenated
    Reconstructed { clip: PathBuf },
    Failed { reason: String },
}

/// How one clip was handled by one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClipOutcome {
    Encoded { output: PathBuf },
    /// Output already present and overwrite is off
    Skipped { output: PathBuf },
    Failed { reason: String },
}

/// A single progress notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProgressEvent {
    Ingest {
        file: PathBuf,
        processed: usize,
        total: usize,
        percent: f32,
        outcome: IngestOutcome,
    },
    Transcode {
        profile_id: String,
        clip: PathBuf,
        processed: usize,
        total: usize,
        percent: f32,
        outcome: ClipOutcome,
    },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Percentage of `processed` over `total`; an empty list is complete.
pub fn percent(processed: usize, total: usize) -> f32 {
    if total == 0 {
        100.0
    } else {
        (processed as f64 * 100.0 / total as f64) as f32
    }
}

/// Publishes `event`, ignoring a closed channel.
pub(crate) fn publish(progress: &ProgressSender, event: ProgressEvent) {
    let _ = progress.send(event);
}

/// Latest progress of every stage, owned by the consumer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressBoard {
    pub ingest_percent: f32,
    pub profile_percent: BTreeMap<String, f32>,
    pub files_transferred: u64,
    pub files_failed: u64,
    pub clips_encoded: u64,
    pub clips_skipped: u64,
    pub clips_failed: u64,
}

impl ProgressBoard {
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Ingest {
                percent, outcome, ..
            } => {
                self.ingest_percent = *percent;
                match outcome {
                    IngestOutcome::Copied { .. } | IngestOutcome::Reconstructed { .. } => {
                        self.files_transferred += 1
                    }
                    IngestOutcome::Failed { .. } => self.files_failed += 1,
                    IngestOutcome::AlreadyIngested | IngestOutcome::Accumulated => {}
                }
            }
            ProgressEvent::Transcode {
                profile_id,
                percent,
                outcome,
                ..
            } => {
                self.profile_percent.insert(profile_id.clone(), *percent);
                match outcome {
                    ClipOutcome::Encoded { .. } => self.clips_encoded += 1,
                    ClipOutcome::Skipped { .. } => self.clips_skipped += 1,
                    ClipOutcome::Failed { .. } => self.clips_failed += 1,
                }
            }
        }
    }
}

/// Spawns the consumer that logs every event and keeps the board.
///
/// The task ends once every sender is dropped and returns the final board.
pub fn spawn_progress_consumer(mut rx: ProgressReceiver) -> JoinHandle<ProgressBoard> {
    tokio::spawn(async move {
        let mut board = ProgressBoard::default();
        while let Some(event) = rx.recv().await {
            match &event {
                ProgressEvent::Ingest {
                    processed,
                    total,
                    percent,
                    ..
                } => info!("Ingest {}/{} ({:.0}%)", processed, total, percent),
                ProgressEvent::Transcode {
                    profile_id,
                    processed,
                    total,
                    percent,
                    ..
                } => info!("[{}] {}/{} ({:.0}%)", profile_id, processed, total, percent),
            }
            board.apply(&event);
        }
        board
    })
}
