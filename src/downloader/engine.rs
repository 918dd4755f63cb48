//! Segmented range download engine

use crate::downloader::addressing::{
    fingerprint, resolve_output_path, segment_files, ResourceFingerprint,
};
use crate::downloader::merger::{cleanup_segments, merge_segments};
use crate::downloader::probe::{probe, ResourceDescriptor};
use crate::downloader::segment::{
    fetch_segment, plan_segments, segment_count, FetchOutcome, SegmentFile,
};
use crate::utils::config::DownloadConfig;
use crate::utils::error::{DownloadError, Result, SegmentFailure, SegmentFailures};
use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, warn};
use url::Url;

/// One download invocation
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: Url,
    /// Final artifact path; derived from the URL and content type when absent
    pub destination: Option<PathBuf>,
    pub segment_size: u64,
    pub tmp_dir: PathBuf,
    pub ranges_disabled: bool,
}

impl DownloadRequest {
    /// Build a request for `url` with the config's segment and storage settings
    pub fn new(url: &str, config: &DownloadConfig) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                url,
                url.scheme()
            )));
        }
        config.validate()?;

        Ok(Self {
            url,
            destination: None,
            segment_size: config.segment_size,
            tmp_dir: config.tmp_dir.clone(),
            ranges_disabled: config.ranges_disabled,
        })
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Transfer strategy a download ended up using
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Ranged,
    Direct,
}

/// Outcome of a finished download
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub mode: DownloadMode,
    pub bytes: u64,
    pub segments: usize,
    /// Segments found complete on disk from an earlier run
    pub segments_reused: usize,
    pub fingerprint: Option<ResourceFingerprint>,
}

/// Multi-segment download engine
pub struct DownloadEngine {
    client: Client,
    config: DownloadConfig,
}

impl DownloadEngine {
    /// Create new download engine with configuration
    pub fn new(config: DownloadConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, config })
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(client: Client, config: DownloadConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Download a resource, choosing between the ranged and direct paths.
    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadReport> {
        if request.ranges_disabled {
            debug!("Ranges disabled, using direct download for {}", request.url);
            return self.download_direct(request).await;
        }

        debug!("Probing {} for range support", request.url);
        let descriptor = probe(&self.client, &request.url, self.config.probe_timeout()).await?;

        if !descriptor.supports_ranges {
            if self.config.fallback_to_direct {
                warn!(
                    "{} does not accept byte ranges, falling back to direct download",
                    request.url
                );
                return self.download_direct(request).await;
            }
            return Err(DownloadError::RangeUnsupported(request.url.to_string()));
        }

        let Some(content_length) = descriptor.content_length else {
            warn!(
                "{} reported no content length, using direct download",
                request.url
            );
            return self.download_direct(request).await;
        };

        self.download_ranged(request, &descriptor, content_length)
            .await
    }

    async fn download_ranged(
        &self,
        request: &DownloadRequest,
        descriptor: &ResourceDescriptor,
        content_length: u64,
    ) -> Result<DownloadReport> {
        let segments_needed = segment_count(content_length, request.segment_size);
        if segments_needed > self.config.max_segments {
            return Err(DownloadError::TooManySegments {
                content_length,
                segments: segments_needed,
                limit: self.config.max_segments,
            });
        }

        let content_type = descriptor.content_type.as_deref();
        let output_path = resolve_output_path(
            &request.url,
            request.destination.as_deref(),
            content_type,
            &current_dir(),
        )?;

        let segments = plan_segments(content_length, request.segment_size);
        let fp = fingerprint(request.url.as_str(), content_type, Some(content_length));
        let files = segment_files(&request.tmp_dir, &fp, &segments);

        info!(
            "Downloading {} ({} bytes) in {} segments, fingerprint {}",
            request.url,
            content_length,
            files.len(),
            fp
        );

        let outcomes = self.fetch_segments(&request.url, &files).await?;
        let segments_reused = outcomes
            .iter()
            .filter(|o| **o == FetchOutcome::Reused)
            .count();
        if segments_reused > 0 {
            info!(
                "Resumed: {} of {} segments were already on disk",
                segments_reused,
                files.len()
            );
        }

        debug!("All segments present, merging into {}", output_path.display());
        let bytes = merge_segments(&files, &output_path).await?;

        if self.config.cleanup_on_success {
            if let Err(e) = cleanup_segments(&request.tmp_dir, &fp).await {
                warn!("Failed to clean up segments: {}", e);
            }
        }

        Ok(DownloadReport {
            path: output_path,
            mode: DownloadMode::Ranged,
            bytes,
            segments: files.len(),
            segments_reused,
            fingerprint: Some(fp),
        })
    }

    /// Fetch every segment concurrently and wait for all of them.
    ///
    /// Results flow back through the stream to this single consumer. When
    /// any segment fails the returned error lists every failure, ordered by
    /// segment index; segments that succeeded stay on disk.
    ///
    /// With `fail_fast` the outstanding fetches are dropped at the first
    /// failure and their half-written `.download` siblings are removed.
    pub async fn fetch_segments(
        &self,
        url: &Url,
        files: &[SegmentFile],
    ) -> Result<Vec<FetchOutcome>> {
        let limit = self
            .config
            .max_concurrent_segments
            .unwrap_or(files.len())
            .max(1);
        let timeout = self.config.segment_timeout();
        let client = &self.client;

        let mut tasks = stream::iter(files)
            .map(|file| async move {
                let result = fetch_segment(client, url, file, timeout).await;
                (file.segment.index, result)
            })
            .buffer_unordered(limit);

        let mut completed = Vec::with_capacity(files.len());
        let mut failures = Vec::new();

        let mut abandoned = false;
        while let Some((index, result)) = tasks.next().await {
            match result {
                Ok(outcome) => {
                    debug!("Segment {} completed ({:?})", index, outcome);
                    completed.push((index, outcome));
                }
                Err(e) => {
                    error!("Segment {} failed: {}", index, e);
                    failures.push(SegmentFailure { index, error: e });
                    if self.config.fail_fast {
                        warn!("Fail-fast enabled, abandoning outstanding segments");
                        abandoned = true;
                        break;
                    }
                }
            }
        }
        drop(tasks);

        if abandoned {
            discard_partials(files).await;
        }

        if !failures.is_empty() {
            failures.sort_by_key(|f| f.index);
            return Err(DownloadError::Segments(SegmentFailures(failures)));
        }

        completed.sort_by_key(|(index, _)| *index);
        Ok(completed.into_iter().map(|(_, outcome)| outcome).collect())
    }

    /// Single unranged GET written straight to the destination
    async fn download_direct(&self, request: &DownloadRequest) -> Result<DownloadReport> {
        debug!("Using direct download for URL: {}", request.url);

        let response = self
            .client
            .get(request.url.clone())
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let output_path = resolve_output_path(
            &request.url,
            request.destination.as_deref(),
            content_type.as_deref(),
            &current_dir(),
        )?;

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::write(parent, e))?;
        }

        let bytes = write_stream(response, &output_path).await?;
        info!(
            "Downloaded {} bytes into {}",
            bytes,
            output_path.display()
        );

        Ok(DownloadReport {
            path: output_path,
            mode: DownloadMode::Direct,
            bytes,
            segments: 0,
            segments_reused: 0,
            fingerprint: None,
        })
    }
}

async fn write_stream(response: reqwest::Response, path: &Path) -> Result<u64> {
    let file = File::create(path)
        .await
        .map_err(|e| DownloadError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut downloaded = 0u64;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::write(path, e))?;
        downloaded += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::write(path, e))?;

    Ok(downloaded)
}

/// Remove `.download` siblings left by fetches that were dropped mid-write
async fn discard_partials(files: &[SegmentFile]) {
    for file in files {
        let partial = file.partial_path();
        match fs::remove_file(&partial).await {
            Ok(()) => debug!("Removed abandoned {}", partial.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", partial.display(), e),
        }
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_config() {
        let config = DownloadConfig {
            segment_size: 1024,
            ranges_disabled: true,
            ..Default::default()
        };
        let request = DownloadRequest::new("https://example.com/a.mp4", &config)
            .unwrap()
            .with_destination("/tmp/out.mp4");

        assert_eq!(request.segment_size, 1024);
        assert!(request.ranges_disabled);
        assert_eq!(request.tmp_dir, config.tmp_dir);
        assert_eq!(request.destination, Some(PathBuf::from("/tmp/out.mp4")));
    }

    #[test]
    fn test_request_rejects_bad_urls() {
        let config = DownloadConfig::default();
        assert!(matches!(
            DownloadRequest::new("not a url", &config),
            Err(DownloadError::InvalidUrl(_))
        ));
        assert!(matches!(
            DownloadRequest::new("ftp://example.com/a.mp4", &config),
            Err(DownloadError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let config = DownloadConfig {
            segment_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            DownloadEngine::new(config),
            Err(DownloadError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_segments_with_nothing_to_do() {
        let engine = DownloadEngine::new(DownloadConfig::default()).unwrap();
        let url = Url::parse("https://example.com/a.mp4").unwrap();
        let outcomes = engine.fetch_segments(&url, &[]).await.unwrap();
        assert!(outcomes.is_empty());
    }
}
