//! Segment planning and ranged fetching

use crate::utils::error::{DownloadError, RangeValidationError, Result};
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};
use url::Url;

/// Inclusive byte range `[start, end]` of the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Segment {
    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the `Range` request header
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// `part.<index>.<start>.<end>`
    pub fn file_name(&self) -> String {
        format!("part.{}.{}.{}", self.index, self.start, self.end)
    }
}

/// A segment and the file it is saved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    pub segment: Segment,
    pub path: PathBuf,
}

impl SegmentFile {
    /// Sibling path the body is streamed into before the final rename
    pub fn partial_path(&self) -> PathBuf {
        let mut raw = self.path.clone().into_os_string();
        raw.push(".download");
        PathBuf::from(raw)
    }

    /// True if a file of exactly the segment's size is already on disk
    pub async fn is_complete(&self) -> bool {
        match fs::metadata(&self.path).await {
            Ok(meta) => meta.is_file() && meta.len() == self.segment.len(),
            Err(_) => false,
        }
    }
}

/// How a segment came to be on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fetched from the origin; carries the byte count
    Downloaded(u64),
    /// A previous run already saved it
    Reused,
}

/// Partition `[0, content_length - 1]` into segments of at most
/// `segment_size` bytes.
///
/// Returns nothing for an empty resource or a zero segment size; the caller
/// has to download such resources directly. The length usually comes from
/// the server, so callers bound it with [`segment_count`] first.
pub fn plan_segments(content_length: u64, segment_size: u64) -> Vec<Segment> {
    if content_length == 0 || segment_size == 0 {
        return Vec::new();
    }

    let last = content_length - 1;
    let mut segments = Vec::new();
    let mut start = 0u64;

    loop {
        let index = segments.len();
        if start.saturating_add(segment_size) >= content_length {
            segments.push(Segment {
                index,
                start,
                end: last,
            });
            break;
        }

        segments.push(Segment {
            index,
            start,
            end: start + segment_size - 1,
        });
        start += segment_size;
    }

    segments
}

/// Number of segments [`plan_segments`] would produce
pub fn segment_count(content_length: u64, segment_size: u64) -> u64 {
    if segment_size == 0 {
        return 0;
    }
    content_length.div_ceil(segment_size)
}

/// Check that a ranged response delivers exactly the requested segment.
///
/// Checks run in order: status, `Content-Range`, `Content-Length`.
pub fn validate_response(
    segment: &Segment,
    status: StatusCode,
    headers: &HeaderMap,
) -> std::result::Result<(), RangeValidationError> {
    if status != StatusCode::PARTIAL_CONTENT {
        return Err(RangeValidationError::WrongStatus(status.as_u16()));
    }

    // Content-Range: bytes 0-10485759/35519965
    let raw = headers
        .get(CONTENT_RANGE)
        .ok_or(RangeValidationError::MissingContentRange)?;
    let raw = String::from_utf8_lossy(raw.as_bytes()).trim().to_string();
    let malformed = || RangeValidationError::MalformedContentRange(raw.clone());

    let (unit, rest) = raw.split_once(' ').ok_or_else(malformed)?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return Err(malformed());
    }
    let (range, _total) = rest.trim().split_once('/').ok_or_else(malformed)?;

    let expected = format!("{}-{}", segment.start, segment.end);
    if range != expected {
        return Err(RangeValidationError::RangeMismatch {
            expected,
            actual: range.to_string(),
        });
    }

    let raw_len = headers
        .get(CONTENT_LENGTH)
        .ok_or(RangeValidationError::MissingContentLength)?;
    let raw_len = String::from_utf8_lossy(raw_len.as_bytes()).trim().to_string();
    let length = raw_len
        .parse::<u64>()
        .map_err(|_| RangeValidationError::MalformedContentLength(raw_len.clone()))?;

    if length != segment.len() {
        return Err(RangeValidationError::LengthMismatch {
            expected: segment.len(),
            actual: length,
        });
    }

    Ok(())
}

/// Download one segment into its file.
///
/// A file already holding the full segment is reused without touching the
/// network. The body is streamed into a sibling file and renamed into place
/// only once its size matches, so an interrupted run never leaves a
/// correctly-sized but truncated segment behind.
pub async fn fetch_segment(
    client: &Client,
    url: &Url,
    file: &SegmentFile,
    timeout: Duration,
) -> Result<FetchOutcome> {
    let segment = file.segment;

    if file.is_complete().await {
        debug!(
            "Segment {} already on disk at {}, skipping",
            segment.index,
            file.path.display()
        );
        return Ok(FetchOutcome::Reused);
    }

    if let Some(parent) = file.path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::write(parent, e))?;
    }

    debug!(
        "Downloading segment {} (bytes {}-{})",
        segment.index, segment.start, segment.end
    );

    let response = client
        .get(url.clone())
        .header(RANGE, segment.range_header())
        .timeout(timeout)
        .send()
        .await
        .map_err(|source| DownloadError::SegmentFetch {
            index: segment.index,
            source,
        })?;

    validate_response(&segment, response.status(), response.headers()).map_err(|kind| {
        DownloadError::RangeValidation {
            index: segment.index,
            kind,
        }
    })?;

    let partial = file.partial_path();
    let written = match write_body(response, &partial, &segment).await {
        Ok(written) => written,
        Err(e) => {
            if let Err(rm) = fs::remove_file(&partial).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", partial.display(), rm);
                }
            }
            return Err(e);
        }
    };

    fs::rename(&partial, &file.path)
        .await
        .map_err(|e| DownloadError::write(&file.path, e))?;

    info!(
        "Segment {} downloaded successfully ({} bytes)",
        segment.index, written
    );

    Ok(FetchOutcome::Downloaded(written))
}

async fn write_body(response: reqwest::Response, path: &Path, segment: &Segment) -> Result<u64> {
    let file = File::create(path)
        .await
        .map_err(|e| DownloadError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0u64;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| DownloadError::SegmentFetch {
            index: segment.index,
            source,
        })?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::write(path, e))?;
        written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::write(path, e))?;

    if written != segment.len() {
        return Err(DownloadError::RangeValidation {
            index: segment.index,
            kind: RangeValidationError::LengthMismatch {
                expected: segment.len(),
                actual: written,
            },
        });
    }

    Ok(written)
}
