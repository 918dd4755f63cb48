//! Download engine module

pub mod addressing;
pub mod engine;
pub mod merger;
pub mod probe;
pub mod segment;

// Re-export for convenience
pub use addressing::{fingerprint, resolve_output_path, ResourceFingerprint};
pub use engine::{DownloadEngine, DownloadMode, DownloadReport, DownloadRequest};
pub use merger::{cleanup_segments, merge_segments};
pub use probe::{probe, ResourceDescriptor};
pub use segment::{
    fetch_segment, plan_segments, segment_count, FetchOutcome, Segment, SegmentFile,
};
