//! Segment file addressing and output naming
//!
//! Temporary segment files live under a directory named after a fingerprint
//! of the resource metadata, so a repeated run for the same resource finds
//! the segments a previous run already saved:
//!
//! ```text
//! <tmp_dir>/<fingerprint>/part.<index>.<start>.<end>
//! ```

use crate::downloader::segment::{Segment, SegmentFile};
use crate::utils::error::{DownloadError, Result};
use percent_encoding::percent_decode_str;
use sanitize_filename::sanitize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Base name used when the URL path has no usable last component
pub const FALLBACK_FILE_NAME: &str = "download";

/// Known media types and the extension each maps to
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/ogg", "ogg"),
    ("video/x-flv", "flv"),
    ("video/x-ms-wmv", "wmv"),
    ("video/x-msvideo", "avi"),
    ("video/x-matroska", "mkv"),
    ("video/mpeg", "mpg"),
    ("video/quicktime", "mov"),
    ("video/x-ms-asf", "asf"),
    ("video/x-ms-wm", "wm"),
    ("video/x-ms-wmx", "wmx"),
    ("video/x-ms-wvx", "wvx"),
    ("video/x-ms-wax", "wax"),
    ("audio/mpeg", "mp3"),
    ("audio/x-ms-wma", "wma"),
];

/// Stable key derived from (URL, content type, content length)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceFingerprint(String);

impl ResourceFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash the identifying metadata of a resource.
///
/// A missing content type hashes as the empty string and an unknown length
/// as `0`.
pub fn fingerprint(
    url: &str,
    content_type: Option<&str>,
    content_length: Option<u64>,
) -> ResourceFingerprint {
    let data = [
        url.to_string(),
        content_type.unwrap_or_default().to_string(),
        content_length.unwrap_or(0).to_string(),
    ]
    .join("-");

    let digest = Sha256::digest(data.as_bytes());
    ResourceFingerprint(hex::encode(digest))
}

/// Directory holding every segment file of one resource
pub fn segment_dir(tmp_dir: &Path, fingerprint: &ResourceFingerprint) -> PathBuf {
    tmp_dir.join(fingerprint.as_str())
}

/// Map planned segments onto their on-disk files
pub fn segment_files(
    tmp_dir: &Path,
    fingerprint: &ResourceFingerprint,
    segments: &[Segment],
) -> Vec<SegmentFile> {
    let dir = segment_dir(tmp_dir, fingerprint);
    segments
        .iter()
        .map(|segment| SegmentFile {
            segment: *segment,
            path: dir.join(segment.file_name()),
        })
        .collect()
}

/// Extension for a media content type, ignoring parameters and case
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

/// Extracts a clean file name from the last URL path segment.
///
/// The segment is percent-decoded and sanitized for the local filesystem.
/// Falls back to [`FALLBACK_FILE_NAME`] when nothing usable remains.
pub fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut s| s.next_back())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().to_string())
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Decide where the final artifact goes.
///
/// An explicit destination wins. Otherwise the name comes from the URL and
/// the file lands in `base_dir`. If the chosen name has no extension, one is
/// derived from `content_type`.
pub fn resolve_output_path(
    url: &Url,
    destination: Option<&Path>,
    content_type: Option<&str>,
    base_dir: &Path,
) -> Result<PathBuf> {
    let (dir, file_name) = match destination {
        Some(dest) => {
            let name = dest
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    DownloadError::InvalidConfig(format!(
                        "destination {} has no file name",
                        dest.display()
                    ))
                })?;
            let dir = dest.parent().map(Path::to_path_buf).unwrap_or_default();
            (dir, name)
        }
        None => (base_dir.to_path_buf(), filename_from_url(url)),
    };

    let has_extension = Path::new(&file_name)
        .extension()
        .map(|ext| !ext.is_empty())
        .unwrap_or(false);
    if has_extension {
        return Ok(dir.join(file_name));
    }

    let ext = content_type
        .and_then(extension_for_content_type)
        .ok_or_else(|| {
            DownloadError::UnsupportedContentType(content_type.unwrap_or_default().to_string())
        })?;

    let stem = file_name.trim_end_matches('.');
    let stem = if stem.is_empty() { FALLBACK_FILE_NAME } else { stem };
    Ok(dir.join(format!("{}.{}", stem, ext)))
}
