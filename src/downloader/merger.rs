//! File segment merger

use crate::downloader::addressing::{segment_dir, ResourceFingerprint};
use crate::downloader::segment::SegmentFile;
use crate::utils::error::{DownloadError, Result};
use std::path::Path;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// Concatenate segment files, in index order, into `output_path`.
///
/// Every segment is checked for presence and size before the output is
/// opened, so a failed merge leaves any previous output untouched. Segment
/// files are kept on disk.
pub async fn merge_segments(segments: &[SegmentFile], output_path: &Path) -> Result<u64> {
    if segments.is_empty() {
        return Err(DownloadError::merge(output_path, "no segments to merge"));
    }

    let mut ordered: Vec<&SegmentFile> = segments.iter().collect();
    ordered.sort_by_key(|f| f.segment.index);

    for file in &ordered {
        let meta = fs::metadata(&file.path).await.map_err(|e| {
            DownloadError::merge(
                &file.path,
                format!("segment {} unreadable: {}", file.segment.index, e),
            )
        })?;
        if meta.len() != file.segment.len() {
            return Err(DownloadError::merge(
                &file.path,
                format!(
                    "segment {} has {} bytes, expected {}",
                    file.segment.index,
                    meta.len(),
                    file.segment.len()
                ),
            ));
        }
    }

    debug!(
        "Merging {} segments into {}",
        ordered.len(),
        output_path.display()
    );

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::write(parent, e))?;
    }

    let output = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output_path)
        .await
        .map_err(|e| DownloadError::write(output_path, e))?;
    let mut writer = BufWriter::new(output);

    let mut total_bytes = 0u64;
    for file in ordered {
        let mut segment_file = File::open(&file.path).await.map_err(|e| {
            DownloadError::merge(
                &file.path,
                format!("segment {} unreadable: {}", file.segment.index, e),
            )
        })?;

        let copied = tokio::io::copy(&mut segment_file, &mut writer)
            .await
            .map_err(|e| DownloadError::write(output_path, e))?;
        total_bytes += copied;

        debug!("Merged segment {} ({} bytes)", file.segment.index, copied);
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::write(output_path, e))?;

    info!(
        "Successfully merged {} bytes into {}",
        total_bytes,
        output_path.display()
    );

    Ok(total_bytes)
}

/// Remove the temporary namespace of one resource
pub async fn cleanup_segments(tmp_dir: &Path, fingerprint: &ResourceFingerprint) -> Result<()> {
    let dir = segment_dir(tmp_dir, fingerprint);
    match fs::remove_dir_all(&dir).await {
        Ok(()) => {
            debug!("Removed segment directory: {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::write(dir, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::addressing::{fingerprint, segment_files};
    use crate::downloader::segment::{plan_segments, Segment};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn seg(index: usize, start: u64, end: u64, path: PathBuf) -> SegmentFile {
        SegmentFile {
            segment: Segment { index, start, end },
            path,
        }
    }

    #[tokio::test]
    async fn test_merge_multiple_segments_in_index_order() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("output.bin");

        let files = vec![
            seg(2, 20, 29, temp_dir.path().join("part.2.20.29")),
            seg(0, 0, 9, temp_dir.path().join("part.0.0.9")),
            seg(1, 10, 19, temp_dir.path().join("part.1.10.19")),
        ];
        std::fs::write(&files[0].path, b"Segment02|").unwrap();
        std::fs::write(&files[1].path, b"Segment00|").unwrap();
        std::fs::write(&files[2].path, b"Segment01|").unwrap();

        let merged = merge_segments(&files, &output_path).await.unwrap();
        assert_eq!(merged, 30);

        let output = std::fs::read_to_string(&output_path).unwrap();
        assert_eq!(output, "Segment00|Segment01|Segment02|");

        // Segment files stay for a later run.
        for file in &files {
            assert!(file.path.exists());
        }
    }

    #[tokio::test]
    async fn test_merge_verifies_data_integrity() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("output.bin");

        let files = vec![
            seg(0, 0, 99, temp_dir.path().join("a")),
            seg(1, 100, 299, temp_dir.path().join("b")),
            seg(2, 300, 449, temp_dir.path().join("c")),
        ];
        std::fs::write(&files[0].path, vec![0xAA; 100]).unwrap();
        std::fs::write(&files[1].path, vec![0xBB; 200]).unwrap();
        std::fs::write(&files[2].path, vec![0xCC; 150]).unwrap();

        merge_segments(&files, &output_path).await.unwrap();

        let output = std::fs::read(&output_path).unwrap();
        assert_eq!(output.len(), 450);
        assert!(output[0..100].iter().all(|&b| b == 0xAA));
        assert!(output[100..300].iter().all(|&b| b == 0xBB));
        assert!(output[300..450].iter().all(|&b| b == 0xCC));
    }

    #[tokio::test]
    async fn test_merge_empty_segments_list() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("output.bin");

        let result = merge_segments(&[], &output_path).await;
        assert!(matches!(result, Err(DownloadError::MergeError { .. })));
    }

    #[tokio::test]
    async fn test_merge_missing_segment_fails_without_output() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("output.bin");

        let files = vec![
            seg(0, 0, 3, temp_dir.path().join("part.0.0.3")),
            seg(1, 4, 7, temp_dir.path().join("part.1.4.7")),
        ];
        std::fs::write(&files[0].path, b"abcd").unwrap();

        let result = merge_segments(&files, &output_path).await;
        assert!(matches!(result, Err(DownloadError::MergeError { .. })));
        assert!(!output_path.exists());
    }

    #[tokio::test]
    async fn test_merge_short_segment_fails() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("output.bin");

        let files = vec![seg(0, 0, 9, temp_dir.path().join("part.0.0.9"))];
        std::fs::write(&files[0].path, b"short").unwrap();

        let err = merge_segments(&files, &output_path).await.unwrap_err();
        assert!(err.to_string().contains("expected 10"));
    }

    #[tokio::test]
    async fn test_merge_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("nested").join("deep").join("output.mp4");

        let files = vec![seg(0, 0, 8, temp_dir.path().join("segment"))];
        std::fs::write(&files[0].path, b"test data").unwrap();

        merge_segments(&files, &output_path).await.unwrap();
        assert_eq!(std::fs::read(&output_path).unwrap(), b"test data");
    }

    #[tokio::test]
    async fn test_cleanup_removes_namespace() {
        let temp_dir = TempDir::new().unwrap();
        let fp = fingerprint("https://example.com/a.mp4", Some("video/mp4"), Some(20));
        let files = segment_files(temp_dir.path(), &fp, &plan_segments(20, 10));

        std::fs::create_dir_all(files[0].path.parent().unwrap()).unwrap();
        for file in &files {
            std::fs::write(&file.path, vec![0u8; 10]).unwrap();
        }

        cleanup_segments(temp_dir.path(), &fp).await.unwrap();
        assert!(!segment_dir(temp_dir.path(), &fp).exists());

        // Second cleanup is a no-op.
        cleanup_segments(temp_dir.path(), &fp).await.unwrap();
    }
}
