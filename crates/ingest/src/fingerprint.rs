//! Fingerprints identifying source recordings in the ledger.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::FingerprintStrategy;
use crate::source::SourceFile;

/// Block size used when streaming a file through the hasher
pub const HASH_BLOCK_SIZE: usize = 8192;

/// Opaque identifier of a recording's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives fingerprints with one strategy for the whole run.
///
/// The same instance must be used for the ledger lookup and for post-copy
/// verification, otherwise a verified copy could never match.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    strategy: FingerprintStrategy,
}

impl Fingerprinter {
    pub fn new(strategy: FingerprintStrategy) -> Self {
        Self { strategy }
    }

    /// Fingerprint of an enumerated source file.
    pub fn fingerprint(&self, source: &SourceFile) -> io::Result<Fingerprint> {
        match self.strategy {
            FingerprintStrategy::ContentHash => content_hash(&source.path),
            FingerprintStrategy::SizeTimestampSignature => Ok(size_timestamp_signature(
                source.size_bytes,
                source.modified_time,
            )),
        }
    }

    /// Fingerprint of an arbitrary file, reading its metadata first.
    pub fn fingerprint_path(&self, path: &Path) -> io::Result<Fingerprint> {
        let source = SourceFile::from_path(path)?;
        self.fingerprint(&source)
    }
}

/// SHA-256 of the file content, streamed in fixed-size blocks, as lowercase hex.
pub fn content_hash(path: &Path) -> io::Result<Fingerprint> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(HASH_BLOCK_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BLOCK_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// `<size>-<seconds>.<nanoseconds>` signature.
///
/// Two distinct files with the same size and modification time produce the
/// same signature.
pub fn size_timestamp_signature(size_bytes: u64, modified: SystemTime) -> Fingerprint {
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Fingerprint(format!(
        "{}-{}.{:09}",
        size_bytes,
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    ))
}
