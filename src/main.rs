//! Rangeloader - segmented HTTP range downloader
//!
//! Command-line front end for the download engine.

use anyhow::{Context, Result};
use clap::Parser;
use rangeloader::utils::platform;
use rangeloader::{DownloadConfig, DownloadEngine, DownloadMode, DownloadRequest};
use std::path::PathBuf;
use tracing::Level;

/// Download a file over HTTP(S) in parallel byte-range segments.
///
/// Interrupted downloads resume from the segments already on disk.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The URL of the file to download
    #[arg(short, long)]
    url: String,

    /// Output file. Defaults to the URL's file name in the current directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum segment size in bytes
    #[arg(long)]
    segment_size: Option<u64>,

    /// Directory for temporary segment files
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    /// Skip byte ranges and download with a single request
    #[arg(long)]
    no_ranges: bool,

    /// Maximum number of segments in flight
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Download directly when the server does not accept byte ranges
    #[arg(long)]
    fallback_direct: bool,

    /// Stop the remaining segments as soon as one fails
    #[arg(long)]
    fail_fast: bool,

    /// Delete segment files after a successful merge
    #[arg(long)]
    cleanup: bool,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<(DownloadConfig, String, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => DownloadConfig::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => DownloadConfig::load_or_default().with_context(|| {
                format!(
                    "loading settings from {}",
                    platform::default_config_path().display()
                )
            })?,
        };

        if let Some(size) = self.segment_size {
            config.segment_size = size;
        }
        if let Some(dir) = self.tmp_dir {
            config.tmp_dir = dir;
        }
        if let Some(limit) = self.concurrency {
            config.max_concurrent_segments = Some(limit);
        }
        config.ranges_disabled |= self.no_ranges;
        config.fallback_to_direct |= self.fallback_direct;
        config.fail_fast |= self.fail_fast;
        config.cleanup_on_success |= self.cleanup;

        Ok((config, self.url, self.output))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let (config, url, output) = args.into_config()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let engine = DownloadEngine::new(config.clone()).context("creating download engine")?;

        let mut request = DownloadRequest::new(&url, &config)?;
        if let Some(output) = output {
            request = request.with_destination(output);
        }

        let report = engine
            .download(&request)
            .await
            .with_context(|| format!("downloading {}", url))?;

        match report.mode {
            DownloadMode::Ranged => println!(
                "Saved {} ({} bytes, {} segments, {} resumed)",
                report.path.display(),
                report.bytes,
                report.segments,
                report.segments_reused
            ),
            DownloadMode::Direct => {
                println!("Saved {} ({} bytes)", report.path.display(), report.bytes)
            }
        }

        Ok::<(), anyhow::Error>(())
    })
}
