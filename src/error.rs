//! Unified error handling for the SVO build pipeline.
//!
//! Every fallible operation in the crate returns [`ForgeResult`]. Errors are
//! grouped by the phase that raises them: configuration validation (before
//! any I/O), file I/O and header parsing, resource exhaustion, and protocol
//! violations inside the streaming octree builder. None of these are retried;
//! a run either completes or fails fatally.

use std::path::PathBuf;

use thiserror::Error;

/// Type alias for Results in svo-forge
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Main error type for the build pipeline
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Rejected before any I/O or computation begins.
    #[error("invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("io error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A header references data files that are missing or truncated.
    #[error("missing or truncated data files for {}", .path.display())]
    MissingFiles { path: PathBuf },

    #[error("corrupt header in {}: {reason}", .path.display())]
    CorruptHeader { path: PathBuf, reason: String },

    #[error("format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// The dense voxel fallback does not fit the memory budget. There is no
    /// further fallback tier.
    #[error("resource exhausted: dense voxel buffer needs {requested} bytes, budget is {budget}")]
    ResourceExhausted { requested: u64, budget: u64 },

    /// The octree builder received a Morton code smaller than the last one.
    #[error("unsorted morton input: code {code} after {last}")]
    UnsortedInput { last: u64, code: u64 },

    /// The octree builder received a Morton code outside the grid volume.
    #[error("morton code {code} out of range for grid volume {volume}")]
    CodeOutOfRange { code: u64, volume: u64 },

    #[error("octree builder already finalized")]
    BuilderFinalized,
}

impl ForgeError {
    /// Attach a path to a raw I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ForgeError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForgeError::UnsortedInput { last: 10, code: 3 };
        assert_eq!(err.to_string(), "unsorted morton input: code 3 after 10");
    }

    #[test]
    fn test_io_error_carries_path() {
        let err = ForgeError::io(
            "mesh.tridata",
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        assert!(err.to_string().contains("mesh.tridata"));
    }
}
