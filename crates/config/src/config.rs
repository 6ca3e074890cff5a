//! Ingest configuration: source layout, archive policy and transcode profiles

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::profile::{default_profiles, Quality, TranscodeProfile};

/// Failure to load a configuration file
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// How a source file is identified in the ledger.
///
/// `SizeTimestampSignature` is nearly free to compute but two different files
/// with the same size and modification time collide. Only use it when the
/// recording device guarantees that pair is unique.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintStrategy {
    /// SHA-256 of the file content
    #[default]
    ContentHash,
    /// File size plus modification timestamp
    SizeTimestampSignature,
}

impl FingerprintStrategy {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "content_hash" | "hash" | "sha256" => Some(Self::ContentHash),
            "size_timestamp_signature" | "signature" => Some(Self::SizeTimestampSignature),
            _ => None,
        }
    }
}

/// Where recordings are read from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Mount root of the recording device
    #[serde(default)]
    pub root: PathBuf,
    /// Stream directory relative to the root
    #[serde(default = "default_stream_subdir")]
    pub stream_subdir: PathBuf,
    /// Recording file extension, without the dot (case-insensitive)
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_stream_subdir() -> PathBuf {
    ["PRIVATE", "AVCHD", "BDMV", "STREAM"].iter().collect()
}

fn default_extension() -> String {
    "MTS".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            stream_subdir: default_stream_subdir(),
            extension: default_extension(),
        }
    }
}

/// Destination archive settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveConfig {
    /// Archive directory receiving the ingested clips
    #[serde(default)]
    pub destination: PathBuf,
    /// Ledger file; relative paths resolve inside `destination`
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
    /// Verify metadata and fingerprint after every copy (default true)
    #[serde(default = "default_verify_copies")]
    pub verify_copies: bool,
    /// Files strictly larger than this are parts of a split clip
    #[serde(default = "default_split_threshold_bytes")]
    pub split_threshold_bytes: u64,
    #[serde(default)]
    pub fingerprint: FingerprintStrategy,
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from("copied_files.log")
}

fn default_verify_copies() -> bool {
    true
}

fn default_split_threshold_bytes() -> u64 {
    2_124_000_000
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::new(),
            ledger_file: default_ledger_file(),
            verify_copies: default_verify_copies(),
            split_threshold_bytes: default_split_threshold_bytes(),
            fingerprint: FingerprintStrategy::default(),
        }
    }
}

/// Transcode stage settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeConfig {
    /// Run the transcode stage after ingest (default true)
    #[serde(default = "default_transcode_enabled")]
    pub enabled: bool,
    /// Re-encode even when an output already exists
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_encoder_program")]
    pub encoder_program: String,
    #[serde(default = "default_deinterlace_filter")]
    pub deinterlace_filter: String,
    #[serde(default = "default_profiles")]
    pub profiles: Vec<TranscodeProfile>,
}

fn default_transcode_enabled() -> bool {
    true
}

fn default_encoder_program() -> String {
    "ffmpeg".to_string()
}

fn default_deinterlace_filter() -> String {
    "yadif".to_string()
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: default_transcode_enabled(),
            overwrite: false,
            encoder_program: default_encoder_program(),
            deinterlace_filter: default_deinterlace_filter(),
            profiles: default_profiles(),
        }
    }
}

/// Immutable run configuration, built once and passed by reference
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
}

impl Config {
    /// Reads and parses a TOML configuration file.
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parses configuration text; absent keys take their defaults
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - INGEST_SOURCE_ROOT -> source.root
    /// - INGEST_DESTINATION -> archive.destination
    /// - INGEST_VERIFY_COPIES -> archive.verify_copies
    /// - INGEST_SPLIT_THRESHOLD_BYTES -> archive.split_threshold_bytes
    /// - INGEST_FINGERPRINT -> archive.fingerprint
    /// - INGEST_TRANSCODE_OVERWRITE -> transcode.overwrite
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("INGEST_SOURCE_ROOT") {
            if !val.is_empty() {
                self.source.root = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("INGEST_DESTINATION") {
            if !val.is_empty() {
                self.archive.destination = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("INGEST_VERIFY_COPIES") {
            if let Some(flag) = parse_bool(&val) {
                self.archive.verify_copies = flag;
            }
        }

        if let Ok(val) = env::var("INGEST_SPLIT_THRESHOLD_BYTES") {
            if let Ok(bytes) = val.parse::<u64>() {
                self.archive.split_threshold_bytes = bytes;
            }
        }

        if let Ok(val) = env::var("INGEST_FINGERPRINT") {
            if let Some(strategy) = FingerprintStrategy::parse(&val) {
                self.archive.fingerprint = strategy;
            }
        }

        if let Ok(val) = env::var("INGEST_TRANSCODE_OVERWRITE") {
            if let Some(flag) = parse_bool(&val) {
                self.transcode.overwrite = flag;
            }
        }
    }

    /// `load_from_file` followed by `apply_env_overrides`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Absolute location of the ledger file
    pub fn ledger_path(&self) -> PathBuf {
        if self.archive.ledger_file.is_absolute() {
            self.archive.ledger_file.clone()
        } else {
            self.archive.destination.join(&self.archive.ledger_file)
        }
    }

    /// Directory holding the recordings on the device
    pub fn source_directory(&self) -> PathBuf {
        self.source.root.join(&self.source.stream_subdir)
    }

    /// Profiles that take part in the transcode stage
    pub fn enabled_profiles(&self) -> impl Iterator<Item = &TranscodeProfile> {
        self.transcode.profiles.iter().filter(|p| p.enabled)
    }

    /// Check the configuration for suspicious values.
    ///
    /// Never fails: every problem is returned as a human-readable warning
    /// and the caller decides what to do with it.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.source.root.as_os_str().is_empty() {
            warnings.push("'source.root' is not set".to_string());
        } else if !self.source.root.is_dir() {
            warnings.push(format!(
                "'source.root' is not a directory: {}",
                self.source.root.display()
            ));
        }

        if self.archive.destination.as_os_str().is_empty() {
            warnings.push("'archive.destination' is not set".to_string());
        } else if self.archive.destination.exists() && !self.archive.destination.is_dir() {
            warnings.push(format!(
                "'archive.destination' exists but is not a directory: {}",
                self.archive.destination.display()
            ));
        }

        if self.archive.split_threshold_bytes == 0 {
            warnings.push(
                "'archive.split_threshold_bytes' is 0; every non-empty file will be treated as a split part"
                    .to_string(),
            );
        }

        if self.archive.fingerprint == FingerprintStrategy::SizeTimestampSignature {
            warnings.push(
                "fingerprint strategy 'size_timestamp_signature' cannot tell apart files with identical size and modification time"
                    .to_string(),
            );
        }

        let mut ids = HashSet::new();
        let mut folders = HashSet::new();
        for profile in &self.transcode.profiles {
            if !ids.insert(profile.id.as_str()) {
                warnings.push(format!("duplicate transcode profile id '{}'", profile.id));
            }
            if !folders.insert(profile.folder.as_str()) {
                warnings.push(format!(
                    "transcode profile '{}' shares folder '{}' with another profile",
                    profile.id, profile.folder
                ));
            }
            match &profile.quality {
                Quality::Bitrate(rate) if rate.trim().is_empty() => {
                    warnings.push(format!("transcode profile '{}' has an empty bitrate", profile.id));
                }
                Quality::Crf(crf) if *crf > 51 => {
                    warnings.push(format!(
                        "transcode profile '{}' has CRF {} outside 0..=51",
                        profile.id, crf
                    ));
                }
                _ => {}
            }
        }

        if self.transcode.enabled && self.enabled_profiles().next().is_none() {
            warnings.push("transcoding is enabled but no profile is enabled".to_string());
        }

        warnings
    }
}

// Accept "true", "1", "yes" as true; "false", "0", "no" as false
fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
