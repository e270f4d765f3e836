//! Download Resolver: turns a [`DirectDownload`] into a concrete installer URL.
//!
//! Static entries resolve to their configured URL. Latest-release entries
//! query the release-metadata endpoint once and pick the first asset whose
//! file name matches the configured pattern; on any network error, parse
//! error or pattern miss they fall back to the last-known-good
//! `fallback_url`. Each tier is tried exactly once.

use crate::catalog::{DirectDownload, UrlKind};
use crate::error::InstallError;
use crate::transport::Transport;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const ASSET_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Where a resolved URL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlSource {
    Static,
    Dynamic,
    Fallback,
}

/// Everything the engine needs to download and launch an installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDownload {
    pub url: String,
    pub extension: String,
    pub install_arguments: Vec<String>,
    pub verification_paths: Vec<String>,
    pub sha256: Option<String>,
    pub source: UrlSource,
}

#[derive(Clone)]
pub struct DownloadResolver {
    transport: Arc<dyn Transport>,
    // Resolved asset URLs per (endpoint, pattern), for the lifetime of the run
    release_cache: moka::future::Cache<String, String>,
}

impl DownloadResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            release_cache: moka::future::Cache::new(256),
        }
    }

    /// Resolve the installer URL for `app_name`.
    ///
    /// # Errors
    ///
    /// [`InstallError::ResolutionFailed`] when neither the dynamic lookup nor
    /// a static URL is usable.
    pub async fn resolve(
        &self,
        app_name: &str,
        download: &DirectDownload,
    ) -> Result<ResolvedDownload, InstallError> {
        let (url, source) = match &download.url_kind {
            UrlKind::Static => self.static_url(app_name, download)?,
            UrlKind::LatestRelease { asset_pattern } => {
                match self.latest_release_asset(&download.url, asset_pattern).await {
                    Ok(url) => (url, UrlSource::Dynamic),
                    Err(reason) => {
                        warn!(app = %app_name, %reason, "release lookup failed, using fallback URL");
                        let fallback = download.fallback_url.clone().ok_or_else(|| {
                            InstallError::ResolutionFailed(format!(
                                "{reason}; no fallback URL configured"
                            ))
                        })?;
                        (fallback, UrlSource::Fallback)
                    }
                }
            }
        };

        debug!(app = %app_name, %url, ?source, "resolved download");

        Ok(ResolvedDownload {
            url,
            extension: download.extension().to_string(),
            install_arguments: download.effective_arguments(),
            verification_paths: download.verification_paths.clone(),
            sha256: download.sha256.clone(),
            source,
        })
    }

    fn static_url(
        &self,
        app_name: &str,
        download: &DirectDownload,
    ) -> Result<(String, UrlSource), InstallError> {
        if !download.url.trim().is_empty() {
            return Ok((download.url.clone(), UrlSource::Static));
        }
        match &download.fallback_url {
            Some(url) => Ok((url.clone(), UrlSource::Fallback)),
            None => Err(InstallError::ResolutionFailed(format!(
                "{app_name} has no download URL"
            ))),
        }
    }

    async fn latest_release_asset(&self, endpoint: &str, pattern: &str) -> Result<String, String> {
        let key = format!("{endpoint}#{pattern}");

        // Check cache first
        if let Some(cached) = self.release_cache.get(&key).await {
            return Ok(cached);
        }

        let release = self
            .transport
            .get_json(endpoint)
            .await
            .map_err(|e| e.to_string())?;
        let url = select_asset(&release, pattern)?;

        self.release_cache.insert(key, url.clone()).await;
        Ok(url)
    }
}

/// Pick the first asset whose name matches `pattern` from a release manifest.
///
/// The manifest is expected to carry an `assets` array of objects with `name`
/// and `browser_download_url`.
pub fn select_asset(release: &serde_json::Value, pattern: &str) -> Result<String, String> {
    let matcher = Pattern::new(pattern).map_err(|e| format!("invalid asset pattern: {e}"))?;
    let assets = release
        .get("assets")
        .and_then(|a| a.as_array())
        .ok_or_else(|| "release manifest has no assets".to_string())?;

    assets
        .iter()
        .find_map(|asset| {
            let name = asset.get("name")?.as_str()?;
            if !matcher.matches_with(name, ASSET_MATCH) {
                return None;
            }
            asset
                .get("browser_download_url")?
                .as_str()
                .map(str::to_string)
        })
        .ok_or_else(|| format!("no release asset matches {pattern}"))
}
