//! Append-only ledger of fingerprints already incorporated into the archive.
//!
//! The ledger is a UTF-8 text file with one fingerprint per line. It is read
//! once into memory when opened and every confirmed transfer is appended to
//! both the file and the in-memory set. An unterminated last line, left by a
//! hand edit or a torn write, is terminated before the next entry.
//!
//! A single writer is assumed for the whole process lifetime. Running two
//! pipelines against the same archive at once may interleave or lose entries.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::fingerprint::Fingerprint;

/// Errors reading or appending to the ledger file.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O failure on {}: {source}", .path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LedgerError {
    fn io(path: &Path, source: io::Error) -> Self {
        LedgerError::IoFailure {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// In-memory view of the ledger file.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: HashSet<String>,
}

impl Ledger {
    /// Opens the ledger at `path`, reading every entry.
    ///
    /// A missing file is an empty ledger; it is created on the first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => parse_entries(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(LedgerError::io(&path, e)),
        };

        debug!("Ledger {} holds {} entries", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True iff `fingerprint` is a full line of the ledger.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains(fingerprint.as_str())
    }

    /// Appends `fingerprint` to the ledger file.
    ///
    /// Call only after the corresponding transfer is confirmed. Creates the
    /// file and its parent directory if needed. The in-memory set is updated
    /// only once the line is written.
    pub fn append(&mut self, fingerprint: &Fingerprint) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| LedgerError::io(&self.path, e))?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::io(&self.path, e))?;
        let terminated =
            ends_with_newline(&mut file).map_err(|e| LedgerError::io(&self.path, e))?;
        let line = if terminated {
            format!("{}\n", fingerprint)
        } else {
            format!("\n{}\n", fingerprint)
        };
        file.write_all(line.as_bytes())
            .map_err(|e| LedgerError::io(&self.path, e))?;
        file.flush().map_err(|e| LedgerError::io(&self.path, e))?;

        self.entries.insert(fingerprint.as_str().to_string());
        debug!("Ledgered {}", fingerprint);
        Ok(())
    }
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn parse_entries(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
