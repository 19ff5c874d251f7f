//! Error types for the YARA scanner
//!
//! Two families live here. [`YaraScanError`] is fatal and returned to the
//! caller before any work starts. [`ScanIssue`] is recorded into the result's
//! `errors` list and never stops a scan.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal scanner error
#[derive(Error, Debug)]
pub enum YaraScanError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Rules directory not found: {}", .0.display())]
    RulesRootMissing(PathBuf),

    #[error("Rules path is not a directory: {}", .0.display())]
    RulesRootNotDirectory(PathBuf),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, YaraScanError>;

/// Recoverable problem recorded in `ScanResult::errors`.
///
/// The `Display` form is exactly the string stored in the result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanIssue {
    #[error("rule file {namespace} failed to compile: {message}")]
    RuleCompile { namespace: String, message: String },

    #[error("no valid rule sources found in {}", rules_root.display())]
    EmptyRuleSet { rules_root: PathBuf },

    #[error("{path}: {message}")]
    FileScan { path: String, message: String },

    #[error("{path}: walk error: {message}")]
    Walk { path: String, message: String },

    #[error("worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },

    #[error("scan aborted: {abandoned} queued file(s) were not scanned")]
    Aborted { abandoned: u64 },
}
