//! Configuration module for the camcorder ingest pipeline
//!
//! Handles loading configuration from TOML files, environment variable overrides,
//! and non-fatal validation of the loaded values.

pub mod config;
pub mod profile;

pub use config::*;
pub use profile::*;
