//! Server capability probing

use crate::utils::error::{DownloadError, Result};
use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// What the origin told us about the resource
#[derive(Debug, Clone, Default)]
pub struct ResourceDescriptor {
    pub content_type: Option<String>,
    /// None when the header is absent, unparseable or zero
    pub content_length: Option<u64>,
    pub supports_ranges: bool,
    pub headers: HeaderMap,
}

impl ResourceDescriptor {
    /// Build a descriptor from a response header set
    pub fn from_headers(headers: HeaderMap) -> Self {
        let supports_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Read the header directly: reqwest reports a zero body hint for HEAD.
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&len| len > 0);

        Self {
            content_type,
            content_length,
            supports_ranges,
            headers,
        }
    }
}

/// Issue a HEAD request and describe the resource
pub async fn probe(client: &Client, url: &Url, timeout: Duration) -> Result<ResourceDescriptor> {
    let response = client
        .head(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(DownloadError::ProbeFailed)?;

    let descriptor = ResourceDescriptor::from_headers(response.headers().clone());
    debug!(
        "Probed {}: status={}, ranges={}, length={:?}, type={:?}",
        url,
        response.status(),
        descriptor.supports_ranges,
        descriptor.content_length,
        descriptor.content_type
    );

    Ok(descriptor)
}
