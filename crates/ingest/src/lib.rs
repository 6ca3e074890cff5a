//! Camcorder Ingest
//!
//! Copies new recordings off an AVCHD camcorder into an archive exactly once,
//! reassembles clips the camera split across several files, then transcodes
//! the new clips with every enabled profile.

pub mod assemble;
pub mod copy;
pub mod encode;
pub mod fingerprint;
pub mod ledger;
pub mod naming;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod startup;

pub use camcorder_ingest_config as config;
pub use camcorder_ingest_config::Config;
pub use assemble::{reconstruct, Classification, ClipPart, SplitClipAssembler};
pub use copy::{Copied, SafeCopier, TransferError};
pub use encode::{
    ConcatenationError, Concatenator, EncodeError, EncodeParams, Encoder, FfmpegConcatenator,
    FfmpegEncoder,
};
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use ledger::{Ledger, LedgerError};
pub use orchestrator::{output_path, ProfileSummary, TranscodeOrchestrator, TranscodeSummary};
pub use pipeline::{FileFailure, IngestError, IngestPipeline, IngestReport};
pub use progress::{
    progress_channel, spawn_progress_consumer, ClipOutcome, IngestOutcome, ProgressBoard,
    ProgressEvent, ProgressReceiver, ProgressSender,
};
pub use source::{enumerate_sources, SourceFile};
pub use startup::{check_encoder_available, parse_ffmpeg_version, StartupError};
