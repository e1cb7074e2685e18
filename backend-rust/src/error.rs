//! Typed error kinds for the detection service.
//!
//! Propagation policy: `ConfigError` and `SourceError` surface to the caller
//! (refuse to start / reject the session). Everything downstream of a running
//! session (record parse failures, rule panics, per-point persistence
//! rejections, subscriber overflow) is absorbed into counters and the
//! terminal session summary instead of aborting the replay.

use std::path::PathBuf;

use thiserror::Error;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a finite, non-negative number (got {value})")]
    BadThreshold { name: &'static str, value: f64 },
    #[error("{name} must be within {min}..={max} (got {value})")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("unknown out-of-order policy {0:?} (expected append_skip_latest, update_latest or discard)")]
    BadPolicy(String),
}

// ── Input source ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("input file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported input extension on {} (expected .csv, .dat, .csv.zst or .dat.zst)", .0.display())]
    UnsupportedExtension(PathBuf),
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("zstd decoder failed on {}: {source}", .path.display())]
    Decompress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input has no header row")]
    EmptyInput,
    #[error("header is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record stream: {0}")]
    Malformed(#[from] csv::Error),
}

// ── Session control ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StateError {
    #[error("a replay session is already active")]
    AlreadyRunning,
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("invalid replay parameter: {0}")]
    Params(String),
}

// ── Storage ───────────────────────────────────────────────────────────────────

/// A storage rejection of one ingest unit (or a whole batch commit).
#[derive(Debug, Error)]
#[error("storage rejected ingest unit: {0}")]
pub struct PersistenceError(#[from] pub sqlx::Error);
