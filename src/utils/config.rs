//! Download configuration

use crate::utils::error::{DownloadError, Result};
use crate::utils::platform;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default maximum segment size (10 MiB)
pub const DEFAULT_SEGMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Default cap on segments per resource (about 1 TiB at the default size)
pub const DEFAULT_MAX_SEGMENTS: u64 = 100_000;

/// Download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum bytes per segment
    pub segment_size: u64,

    /// Root for per-resource temporary segment directories
    pub tmp_dir: PathBuf,

    /// Skip range probing and always do a single GET
    pub ranges_disabled: bool,

    /// Cap on simultaneous segment requests (None = one per segment)
    pub max_concurrent_segments: Option<usize>,

    /// Upper bound on segments per resource; larger resources are refused
    pub max_segments: u64,

    /// Timeout for each ranged GET
    pub segment_timeout_secs: u64,

    /// Timeout for the HEAD probe
    pub probe_timeout_secs: u64,

    /// Fall back to a direct download when the server lacks range support
    pub fallback_to_direct: bool,

    /// Stop outstanding segments after the first failure and discard their
    /// partial files
    pub fail_fast: bool,

    /// Remove the segment directory after a successful merge
    pub cleanup_on_success: bool,

    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            tmp_dir: std::env::temp_dir(),
            ranges_disabled: false,
            max_concurrent_segments: None,
            max_segments: DEFAULT_MAX_SEGMENTS,
            segment_timeout_secs: 120,
            probe_timeout_secs: 30,
            fallback_to_direct: false,
            fail_fast: false,
            cleanup_on_success: false,
            user_agent: concat!("rangeloader/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DownloadConfig {
    /// Load settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DownloadError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let config: DownloadConfig = serde_json::from_str(&raw)
            .map_err(|e| DownloadError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location if it exists, otherwise use defaults
    pub fn load_or_default() -> Result<Self> {
        let path = platform::default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 {
            return Err(DownloadError::InvalidConfig(
                "segment_size must be greater than zero".to_string(),
            ));
        }
        if self.max_segments == 0 {
            return Err(DownloadError::InvalidConfig(
                "max_segments must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_segments == Some(0) {
            return Err(DownloadError::InvalidConfig(
                "max_concurrent_segments must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
