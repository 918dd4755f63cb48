//! Utility modules for error handling and configuration

pub mod config;
pub mod error;
pub mod platform;

// Re-export for convenience
pub use config::{DownloadConfig, DEFAULT_MAX_SEGMENTS, DEFAULT_SEGMENT_SIZE};
pub use error::{DownloadError, RangeValidationError, SegmentFailure, SegmentFailures};
