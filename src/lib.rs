//! Rangeloader library
//!
//! Downloads a single HTTP(S) resource by splitting it into byte-range
//! segments, fetching them concurrently and merging them into one file.
//! Segments land in a temporary directory keyed by a fingerprint of the
//! resource metadata, so an interrupted download resumes where it stopped.

pub mod downloader;
pub mod utils;

// Re-export main types for easier use
pub use downloader::{DownloadEngine, DownloadMode, DownloadReport, DownloadRequest};
pub use utils::{DownloadConfig, DownloadError};
