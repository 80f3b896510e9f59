// GEMMSCALE ERROR TAXONOMY
// EVERY FAILURE IS FATAL TO THE STUDY. NOTHING HERE IS RETRIED.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StudyError>;

#[derive(Debug, Error)]
pub enum StudyError {
    // HELPER FAILED TO RUN OR DID NOT PRINT A POSITIVE INTEGER
    #[error("core discovery via {helper} failed: {reason}")]
    CoreDiscovery { helper: String, reason: String },

    // SPAWN FAILURE OR NON-ZERO EXIT
    #[error("kernel {kernel} failed: {reason}")]
    KernelExecution { kernel: PathBuf, reason: String },

    #[error("kernel exceeded {timeout:?} at concurrency {concurrency}")]
    KernelTimeout { concurrency: u32, timeout: Duration },

    // RESULT LINE DOES NOT MATCH M N K CORES ELAPSED ..
    #[error("malformed kernel output ({reason}): {line:?}")]
    MalformedOutput { line: String, reason: String },

    #[error("invalid measurement at sample {index} (cores={concurrency}): elapsed={elapsed}")]
    InvalidMeasurement {
        index: usize,
        concurrency: u32,
        elapsed: f64,
    },

    #[error("invalid {what} {value}: {reason}")]
    InvalidProblemSize {
        what: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("scaling series is empty")]
    EmptySeries,

    // ONLY RAISED WITH --strict-cores
    #[error("kernel reported {reported} cores, {requested} were requested")]
    CoreMismatch { requested: u32, reported: u32 },

    #[error("study interrupted")]
    Interrupted,

    #[error("failed to render chart {path}: {reason}")]
    Chart { path: PathBuf, reason: String },
}
