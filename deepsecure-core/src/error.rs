//! Error types for the deepsecure-core library.
//!
//! Per-classifier and per-analyzer failures are recovered inside the engine
//! and folded into neutral values or exclusion from fusion. Only exhaustion of
//! every source for a request reaches the caller.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;

/// Custom error types for deepsecure
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The learned classifier family cannot run. The engine keeps working in
    /// heuristic mode, so this is never user-fatal.
    #[error("Classifier backend unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Classifier '{0}' is not loaded")]
    ClassifierUnavailable(String),

    #[error("No valid predictions from any classifier")]
    NoValidPredictions,

    #[error("No analyzable frames in video: {}", .0.display())]
    NoAnalyzableFrames(PathBuf),

    #[error("Could not read media file {}: {reason}", path.display())]
    MediaUnreadable { path: PathBuf, reason: String },

    /// A single sub-analyzer failed. Recovered locally with a neutral score.
    #[error("Analyzer '{analyzer}' degraded: {reason}")]
    AnalyzerDegraded { analyzer: String, reason: String },

    #[error("Classifier backend error: {0}")]
    Backend(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Required dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Failed to start command '{0}': {1}")]
    CommandStart(String, std::io::Error),

    #[error("Command '{0}' failed with status {1}: {2}")]
    CommandFailed(String, ExitStatus, String),

    #[error("Failed to parse ffprobe output: {0}")]
    FfprobeParse(String),

    #[error("{0}")]
    OperationFailed(String),
}

impl CoreError {
    /// Whether repeating the failed call on the same input can succeed.
    /// Device and I/O errors can clear; every other failure recurs.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Backend(_) | CoreError::Io(_))
    }
}

/// Result type for deepsecure operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Builds a `MediaUnreadable` error for `path`.
pub(crate) fn media_unreadable(path: &Path, reason: impl ToString) -> CoreError {
    CoreError::MediaUnreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Builds an `AnalyzerDegraded` error for the named analyzer.
pub(crate) fn analyzer_degraded(analyzer: &str, reason: impl ToString) -> CoreError {
    CoreError::AnalyzerDegraded {
        analyzer: analyzer.to_string(),
        reason: reason.to_string(),
    }
}


#[cfg(feature = "classifiers")]
impl From<candle_core::Error> for CoreError {
    fn from(err: candle_core::Error) -> Self {
        CoreError::Backend(err.to_string())
    }
}
