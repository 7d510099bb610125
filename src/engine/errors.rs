//! Error types for the probe statistics engine

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine operations
///
/// Only conditions that indicate misconfiguration end up here. Data noise
/// (malformed lines, unclassified outcomes, AS lookup misses) is recovered
/// locally during ingestion and never surfaces as a `ProbeStatError`.
#[derive(Debug, Error)]
pub enum ProbeStatError {
    /// Opening, reading or writing a file failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The AS database could not be loaded
    #[error("AS database error ({}): {message}", .path.display())]
    AsnDatabase { path: PathBuf, message: String },

    /// A classification worker panicked
    #[error("Classification worker panicked")]
    WorkerPanicked,

    /// Report serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProbeStatError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProbeStatError>;

/// Reason a single input line was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    /// Line is not valid JSON or lacks a required field
    InvalidJson(String),
    /// Line bytes are not valid UTF-8
    InvalidUtf8(String),
    /// `ip` or `domain` is present but empty
    EmptyKey,
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "invalid record: {}", msg),
            Self::InvalidUtf8(msg) => write!(f, "line is not valid UTF-8: {}", msg),
            Self::EmptyKey => write!(f, "record has an empty ip or domain"),
        }
    }
}

impl std::error::Error for MalformedRecord {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = ProbeStatError::io(
            "/tmp/missing.log",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        let text = err.to_string();
        assert!(text.contains("/tmp/missing.log"));
        assert!(text.contains("no such file"));
    }

    #[test]
    fn test_malformed_display() {
        assert_eq!(
            MalformedRecord::EmptyKey.to_string(),
            "record has an empty ip or domain"
        );
        assert!(MalformedRecord::InvalidJson("eof".into())
            .to_string()
            .starts_with("invalid record"));
    }
}
