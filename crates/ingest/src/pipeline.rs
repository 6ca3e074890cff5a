//! Stage 1: ingest recordings from the camcorder into the archive.
//!
//! Runs on a single thread, strictly in recording order:
//! fingerprint -> ledger check -> classify -> copy or concatenate -> rename
//! -> ledger append. Per-file failures are logged and skipped; only an
//! unusable destination directory aborts the run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::assemble::{reconstruct, Classification, ClipPart, SplitClipAssembler};
use crate::config::Config;
use crate::copy::{SafeCopier, TransferError};
use crate::encode::Concatenator;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::ledger::{Ledger, LedgerError};
use crate::naming::rename_to_canonical;
use crate::progress::{percent, publish, IngestOutcome, ProgressEvent, ProgressSender};
use crate::source::{enumerate_sources, SourceFile};

/// Fatal ingest errors
#[derive(Debug, Error)]
pub enum IngestError {
    /// The archive directory could not be created or resolved
    #[error("Destination {} is unavailable: {source}", .path.display())]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The existing ledger could not be read
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// One source file that could not be transferred
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of one ingest run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Archive paths of the clips transferred in this run, in order
    pub transferred: Vec<PathBuf>,
    /// Source files skipped because their fingerprint was already ledgered
    pub already_ingested: usize,
    pub failures: Vec<FileFailure>,
    /// Trailing split parts that were never closed, left on the device
    pub unclosed_group: Vec<PathBuf>,
    /// Ledger appends that failed after a confirmed transfer
    pub ledger_failures: Vec<String>,
}

impl IngestReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty() || !self.ledger_failures.is_empty()
    }
}

/// Drives one ingest run over the configured source directory.
pub struct IngestPipeline<'a> {
    config: &'a Config,
    fingerprinter: Fingerprinter,
    copier: SafeCopier,
    concatenator: &'a dyn Concatenator,
    progress: ProgressSender,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(
        config: &'a Config,
        concatenator: &'a dyn Concatenator,
        progress: ProgressSender,
    ) -> Self {
        let fingerprinter = Fingerprinter::new(config.archive.fingerprint);
        Self {
            config,
            fingerprinter,
            copier: SafeCopier::new(fingerprinter, config.archive.verify_copies),
            concatenator,
            progress,
        }
    }

    /// Ingests every new recording and returns the transferred clips.
    pub fn run(&self) -> Result<IngestReport, IngestError> {
        let destination = prepare_destination(&self.config.archive.destination)?;
        let mut ledger = Ledger::open(self.config.ledger_path())?;

        let source_dir = self.config.source_directory();
        let sources = enumerate_sources(&source_dir, &self.config.source.extension);
        info!(
            "Found {} recordings in {} ({} already ledgered fingerprints)",
            sources.len(),
            source_dir.display(),
            ledger.len()
        );

        let mut assembler = SplitClipAssembler::new(self.config.archive.split_threshold_bytes);
        let mut report = IngestReport::default();
        let total = sources.len();

        for (index, source) in sources.into_iter().enumerate() {
            let file = source.path.clone();
            let outcome =
                self.process(source, &destination, &mut ledger, &mut assembler, &mut report);
            publish(
                &self.progress,
                ProgressEvent::Ingest {
                    file,
                    processed: index + 1,
                    total,
                    percent: percent(index + 1, total),
                    outcome,
                },
            );
        }

        let trailing = assembler.finish();
        if !trailing.is_empty() {
            warn!(
                "{} split parts at the end of the recording list have no closing part; they were not transferred: {}",
                trailing.len(),
                trailing
                    .iter()
                    .map(|p| p.source.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            report.unclosed_group = trailing.into_iter().map(|p| p.source.path).collect();
        }

        info!(
            "Ingest finished: {} transferred, {} already ingested, {} failed",
            report.transferred.len(),
            report.already_ingested,
            report.failures.len()
        );
        Ok(report)
    }

    fn process(
        &self,
        source: SourceFile,
        destination: &Path,
        ledger: &mut Ledger,
        assembler: &mut SplitClipAssembler,
        report: &mut IngestReport,
    ) -> IngestOutcome {
        let fingerprint = match self.fingerprinter.fingerprint(&source) {
            Ok(fp) => fp,
            Err(e) => {
                let err = TransferError::from_io(&source.path, e);
                abandon_group(assembler, &source, report);
                return fail(report, &source.path, err.to_string());
            }
        };

        debug!("{} fingerprint {}", source.name(), fingerprint);

        if ledger.contains(&fingerprint) {
            info!("Skipping {}: already ingested", source.name());
            report.already_ingested += 1;
            return IngestOutcome::AlreadyIngested;
        }

        match assembler.offer(ClipPart {
            source,
            fingerprint,
        }) {
            Classification::Accumulated => IngestOutcome::Accumulated,
            Classification::Abandoned(part) => fail(
                report,
                &part.source.path,
                "part of a split clip with an unreadable part".to_string(),
            ),
            Classification::Standalone(part) => {
                self.transfer_standalone(part, destination, ledger, report)
            }
            Classification::Flush(group) => {
                self.transfer_group(group, destination, ledger, report)
            }
        }
    }

    fn transfer_standalone(
        &self,
        part: ClipPart,
        destination: &Path,
        ledger: &mut Ledger,
        report: &mut IngestReport,
    ) -> IngestOutcome {
        let source = &part.source;
        let copied = match self.copier.copy(&source.path, destination, &part.fingerprint) {
            Ok(copied) => copied,
            Err(e) => return fail(report, &source.path, e.to_string()),
        };

        let clip = match rename_to_canonical(&copied.path, destination) {
            Ok(path) => path,
            Err(e) => {
                let reason = format!("rename of {} failed: {}", copied.path.display(), e);
                return fail(report, &source.path, reason);
            }
        };

        info!(
            "Copied {} -> {} ({} bytes)",
            source.name(),
            clip.display(),
            copied.bytes
        );
        record_ledger(ledger, &part.fingerprint, report);
        report.transferred.push(clip.clone());
        IngestOutcome::Copied { clip }
    }

    fn transfer_group(
        &self,
        group: Vec<ClipPart>,
        destination: &Path,
        ledger: &mut Ledger,
        report: &mut IngestReport,
    ) -> IngestOutcome {
        match reconstruct(&group, destination, self.concatenator) {
            Ok(clip) => {
                info!(
                    "Reconstructed split clip from {} parts -> {}",
                    group.len(),
                    clip.display()
                );
                for part in &group {
                    record_ledger(ledger, &part.fingerprint, report);
                }
                report.transferred.push(clip.clone());
                IngestOutcome::Reconstructed { clip }
            }
            Err(e) => {
                let names: Vec<String> = group.iter().map(|p| p.source.name()).collect();
                let reason = format!("concatenation of {} failed: {}", names.join(", "), e);
                let closing = group
                    .last()
                    .map(|p| p.source.path.clone())
                    .unwrap_or_default();
                fail(report, &closing, reason)
            }
        }
    }
}

/// Creates the archive directory and resolves it to an absolute path.
fn prepare_destination(destination: &Path) -> Result<PathBuf, IngestError> {
    let unavailable = |source: std::io::Error| IngestError::DestinationUnavailable {
        path: destination.to_path_buf(),
        source,
    };

    if destination.as_os_str().is_empty() {
        return Err(unavailable(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "no destination configured",
        )));
    }

    fs::create_dir_all(destination).map_err(unavailable)?;
    fs::canonicalize(destination).map_err(unavailable)
}

/// Drops the split group `failed` belonged to, reporting every pending part.
fn abandon_group(
    assembler: &mut SplitClipAssembler,
    failed: &SourceFile,
    report: &mut IngestReport,
) {
    for part in assembler.abandon(failed.size_bytes) {
        let reason = format!(
            "split clip abandoned because {} could not be read",
            failed.name()
        );
        fail(report, &part.source.path, reason);
    }
}

fn record_ledger(ledger: &mut Ledger, fingerprint: &Fingerprint, report: &mut IngestReport) {
    if let Err(e) = ledger.append(fingerprint) {
        error!("{} (the clip may be ingested again next run)", e);
        report.ledger_failures.push(e.to_string());
    }
}

fn fail(report: &mut IngestReport, path: &Path, reason: String) -> IngestOutcome {
    error!("Failed to ingest {}: {}", path.display(), reason);
    report.failures.push(FileFailure {
        path: path.to_path_buf(),
        reason: reason.clone(),
    });
    IngestOutcome::Failed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::tests::{ByteConcatenator, FailingConcatenator};
    use crate::config::FingerprintStrategy;
    use crate::copy::preserve_modified;
    use crate::progress::progress_channel;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        config: Config,
        stream: PathBuf,
    }

    fn fixture(threshold: u64) -> Fixture {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.source.root = temp.path().join("camcorder");
        config.archive.destination = temp.path().join("archive");
        config.archive.split_threshold_bytes = threshold;
        let stream = config.source_directory();
        fs::create_dir_all(&stream).unwrap();
        Fixture {
            _temp: temp,
            config,
            stream,
        }
    }

    fn record(dir: &Path, name: &str, size: usize, secs: u64) {
        let path = dir.join(name);
        let content: Vec<u8> = name.bytes().cycle().take(size).collect();
        fs::write(&path, content).unwrap();
        preserve_modified(&path, UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
    }

    #[test]
    fn test_empty_destination_is_fatal() {
        let mut f = fixture(10);
        f.config.archive.destination = PathBuf::new();
        let (tx, _rx) = progress_channel();

        let result = IngestPipeline::new(&f.config, &ByteConcatenator::default(), tx).run();

        assert!(matches!(result, Err(IngestError::DestinationUnavailable { .. })));
    }

    #[test]
    fn test_uncreatable_destination_is_fatal() {
        let f = fixture(10);
        let blocker = f.stream.join("blocker");
        fs::write(&blocker, b"").unwrap();
        let mut config = f.config.clone();
        config.archive.destination = blocker.join("archive");
        let (tx, _rx) = progress_channel();

        let result = IngestPipeline::new(&config, &ByteConcatenator::default(), tx).run();

        assert!(matches!(result, Err(IngestError::DestinationUnavailable { .. })));
    }

    #[test]
    fn test_progress_is_published_per_file() {
        let f = fixture(10);
        record(&f.stream, "00001.MTS", 5, 1_600_000_000);
        record(&f.stream, "00002.MTS", 20, 1_600_000_100);
        record(&f.stream, "00003.MTS", 5, 1_600_000_200);
        let (tx, mut rx) = progress_channel();

        let report = IngestPipeline::new(&f.config, &ByteConcatenator::default(), tx)
            .run()
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        let outcomes: Vec<IngestOutcome> = events
            .into_iter()
            .map(|e| match e {
                ProgressEvent::Ingest { outcome, .. } => outcome,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert!(matches!(outcomes[0], IngestOutcome::Copied { .. }));
        assert_eq!(outcomes[1], IngestOutcome::Accumulated);
        assert!(matches!(outcomes[2], IngestOutcome::Reconstructed { .. }));
        assert_eq!(report.transferred.len(), 2);
    }

    #[test]
    fn test_concatenation_failure_ledgers_nothing() {
        let f = fixture(10);
        record(&f.stream, "00001.MTS", 20, 1_600_000_000);
        record(&f.stream, "00002.MTS", 5, 1_600_000_100);
        let (tx, _rx) = progress_channel();

        let report = IngestPipeline::new(&f.config, &FailingConcatenator, tx)
            .run()
            .unwrap();

        assert!(report.transferred.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, f.stream.join("00002.MTS"));
        assert!(Ledger::open(f.config.ledger_path()).unwrap().is_empty());

        // The parts are classified again on the next run
        let (tx, _rx) = progress_channel();
        let retry = IngestPipeline::new(&f.config, &ByteConcatenator::default(), tx)
            .run()
            .unwrap();
        assert_eq!(retry.transferred.len(), 1);
        assert_eq!(Ledger::open(f.config.ledger_path()).unwrap().len(), 2);
    }

    /// Runs `process` over sources enumerated before `missing` was deleted.
    fn ingest_with_missing(
        f: &Fixture,
        missing: &str,
        concatenator: &dyn Concatenator,
    ) -> (Vec<IngestOutcome>, IngestReport, Ledger) {
        let sources = enumerate_sources(&f.stream, "MTS");
        fs::remove_file(f.stream.join(missing)).unwrap();

        let (tx, _rx) = progress_channel();
        let pipeline = IngestPipeline::new(&f.config, concatenator, tx);
        let destination = prepare_destination(&f.config.archive.destination).unwrap();
        let mut ledger = Ledger::open(f.config.ledger_path()).unwrap();
        let mut assembler = SplitClipAssembler::new(f.config.archive.split_threshold_bytes);
        let mut report = IngestReport::default();

        let outcomes = sources
            .into_iter()
            .map(|source| {
                pipeline.process(source, &destination, &mut ledger, &mut assembler, &mut report)
            })
            .collect();
        report.unclosed_group = assembler.finish().into_iter().map(|p| p.source.path).collect();
        (outcomes, report, ledger)
    }

    #[test]
    fn test_missing_middle_part_abandons_split_clip() {
        let f = fixture(10);
        record(&f.stream, "00001.MTS", 20, 1_600_000_000);
        record(&f.stream, "00002.MTS", 20, 1_600_000_100);
        record(&f.stream, "00003.MTS", 5, 1_600_000_200);
        record(&f.stream, "00004.MTS", 5, 1_600_000_300);
        let concatenator = ByteConcatenator::default();

        let (outcomes, report, ledger) = ingest_with_missing(&f, "00002.MTS", &concatenator);

        assert_eq!(outcomes[0], IngestOutcome::Accumulated);
        assert!(matches!(outcomes[1], IngestOutcome::Failed { .. }));
        assert!(matches!(outcomes[2], IngestOutcome::Failed { .. }));
        assert!(matches!(outcomes[3], IngestOutcome::Copied { .. }));
        assert!(concatenator.calls.lock().unwrap().is_empty());

        let failed: Vec<PathBuf> = report.failures.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            failed,
            vec![
                f.stream.join("00001.MTS"),
                f.stream.join("00002.MTS"),
                f.stream.join("00003.MTS"),
            ]
        );
        assert_eq!(report.transferred.len(), 1);
        assert!(report.unclosed_group.is_empty());
        assert_eq!(ledger.len(), 1);
        assert_eq!(Ledger::open(f.config.ledger_path()).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_closing_part_abandons_split_clip() {
        let f = fixture(10);
        record(&f.stream, "00001.MTS", 20, 1_600_000_000);
        record(&f.stream, "00002.MTS", 5, 1_600_000_100);
        record(&f.stream, "00003.MTS", 5, 1_600_000_200);
        let concatenator = ByteConcatenator::default();

        let (outcomes, report, ledger) = ingest_with_missing(&f, "00002.MTS", &concatenator);

        assert_eq!(outcomes[0], IngestOutcome::Accumulated);
        assert!(matches!(outcomes[1], IngestOutcome::Failed { .. }));
        assert!(matches!(outcomes[2], IngestOutcome::Copied { .. }));
        assert!(concatenator.calls.lock().unwrap().is_empty());
        assert_eq!(report.failures.len(), 2);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_missing_first_part_abandons_split_clip() {
        let f = fixture(10);
        record(&f.stream, "00001.MTS", 20, 1_600_000_000);
        record(&f.stream, "00002.MTS", 20, 1_600_000_100);
        record(&f.stream, "00003.MTS", 5, 1_600_000_200);
        let concatenator = ByteConcatenator::default();

        let (outcomes, report, ledger) = ingest_with_missing(&f, "00001.MTS", &concatenator);

        assert!(outcomes
            .iter()
            .all(|o| matches!(o, IngestOutcome::Failed { .. })));
        assert!(concatenator.calls.lock().unwrap().is_empty());
        assert!(report.transferred.is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_duplicate_content_in_one_run_is_ingested_once() {
        let f = fixture(100);
        record(&f.stream, "00001.MTS", 8, 1_600_000_000);
        fs::copy(f.stream.join("00001.MTS"), f.stream.join("00002.MTS")).unwrap();
        let (tx, _rx) = progress_channel();

        let report = IngestPipeline::new(&f.config, &ByteConcatenator::default(), tx)
            .run()
            .unwrap();

        assert_eq!(report.transferred.len(), 1);
        assert_eq!(report.already_ingested, 1);
    }

    #[test]
    fn test_signature_strategy_ingests_and_deduplicates() {
        let mut f = fixture(100);
        f.config.archive.fingerprint = FingerprintStrategy::SizeTimestampSignature;
        record(&f.stream, "00001.MTS", 8, 1_600_000_000);

        let (tx, _rx) = progress_channel();
        let first = IngestPipeline::new(&f.config, &ByteConcatenator::default(), tx)
            .run()
            .unwrap();
        let (tx, _rx) = progress_channel();
        let second = IngestPipeline::new(&f.config, &ByteConcatenator::default(), tx)
            .run()
            .unwrap();

        assert_eq!(first.transferred.len(), 1);
        assert!(second.transferred.is_empty());
        assert_eq!(second.already_ingested, 1);
    }
}
