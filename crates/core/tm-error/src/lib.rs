//! Error types for trailmirror.
//!
//! This crate provides:
//! - [`TmError`] - Top-level error enum shared across the pipeline crates
//! - A [`Result`] alias used throughout the workspace
//!
//! Setup-stage errors (config, state DB open, output directory) are fatal and
//! bubble up to the CLI. Runtime errors (S3 calls, decode failures, sink
//! writes) are logged and counted at the call site; the pipeline keeps going.

use thiserror::Error;

/// Top-level error type for trailmirror.
#[derive(Error, Debug)]
pub enum TmError {
    /// S3 listing or download failures
    #[error("S3 error: {0}")]
    S3(String),

    /// Checkpoint store failures (open, query, upsert)
    #[error("State error: {0}")]
    State(String),

    /// Dedup filter persistence failures
    #[error("Filter error: {0}")]
    Filter(String),

    /// Decompression or JSON decode failures for a downloaded object
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from the JSONL sink and filter files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors (wrapped anyhow)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using TmError.
pub type Result<T> = std::result::Result<T, TmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TmError::S3("list objects failed: timeout".to_string());
        assert!(error.to_string().contains("S3 error"));
        assert!(error.to_string().contains("timeout"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: TmError = io.into();
        assert!(matches!(error, TmError::Io(_)));
    }

    #[test]
    fn test_anyhow_error_conversion() {
        let error: TmError = anyhow::anyhow!("something else").into();
        assert_eq!(error.to_string(), "something else");
    }
}
