//! Error handling for Rangeloader

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Rangeloader
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Capability probe failed: {0}")]
    ProbeFailed(#[source] reqwest::Error),

    #[error("Server does not support range requests: {0}")]
    RangeUnsupported(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported content type: {0:?}")]
    UnsupportedContentType(String),

    #[error("Segment {index} rejected: {kind}")]
    RangeValidation {
        index: usize,
        kind: RangeValidationError,
    },

    #[error("Segment {index} fetch failed: {source}")]
    SegmentFetch {
        index: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0}")]
    Segments(SegmentFailures),

    #[error("Merge failed for {}: {reason}", .path.display())]
    MergeError { path: PathBuf, reason: String },

    #[error("Write failed for {}: {source}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource of {content_length} bytes needs {segments} segments, limit is {limit}")]
    TooManySegments {
        content_length: u64,
        segments: u64,
        limit: u64,
    },
}

impl DownloadError {
    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DownloadError::WriteError {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn merge(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DownloadError::MergeError {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Reason a ranged response was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeValidationError {
    #[error("expected 206 Partial Content, got status {0}")]
    WrongStatus(u16),

    #[error("missing Content-Range header")]
    MissingContentRange,

    #[error("malformed Content-Range header: {0:?}")]
    MalformedContentRange(String),

    #[error("Content-Range covers {actual}, expected {expected}")]
    RangeMismatch { expected: String, actual: String },

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("malformed Content-Length header: {0:?}")]
    MalformedContentLength(String),

    #[error("Content-Length is {actual}, expected {expected}")]
    LengthMismatch { expected: u64, actual: u64 },
}

/// One failed segment inside an aggregate error
#[derive(Debug)]
pub struct SegmentFailure {
    pub index: usize,
    pub error: DownloadError,
}

/// Every segment that failed during one run, ordered by index
#[derive(Debug, Default)]
pub struct SegmentFailures(pub Vec<SegmentFailure>);

impl SegmentFailures {
    pub fn indices(&self) -> Vec<usize> {
        self.0.iter().map(|f| f.index).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentFailure> {
        self.0.iter()
    }
}

impl fmt::Display for SegmentFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} segment(s) failed", self.0.len())?;
        for failure in &self.0 {
            write!(f, "; [{}] {}", failure.index, failure.error)?;
        }
        Ok(())
    }
}

pub type Result<T, E = DownloadError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_failures_display_lists_every_index() {
        let failures = SegmentFailures(vec![
            SegmentFailure {
                index: 1,
                error: DownloadError::RangeValidation {
                    index: 1,
                    kind: RangeValidationError::WrongStatus(200),
                },
            },
            SegmentFailure {
                index: 4,
                error: DownloadError::RangeValidation {
                    index: 4,
                    kind: RangeValidationError::MissingContentRange,
                },
            },
        ]);

        let msg = DownloadError::Segments(failures).to_string();
        assert!(msg.starts_with("2 segment(s) failed"));
        assert!(msg.contains("[1] Segment 1 rejected: expected 206"));
        assert!(msg.contains("[4] Segment 4 rejected: missing Content-Range"));
    }

    #[test]
    fn test_indices() {
        let failures = SegmentFailures(vec![
            SegmentFailure {
                index: 0,
                error: DownloadError::InvalidConfig("x".into()),
            },
            SegmentFailure {
                index: 7,
                error: DownloadError::InvalidConfig("y".into()),
            },
        ]);
        assert_eq!(failures.indices(), vec![0, 7]);
        assert_eq!(failures.len(), 2);
        assert!(!failures.is_empty());
    }
}
