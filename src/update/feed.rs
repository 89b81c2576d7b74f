//! Release feed, asset download and checksum verification
//!
//! Releases are published on GitHub. Each release carries one installer
//! per platform and, when GitHub computed one, its SHA256 digest.

use crate::error::UpdateError;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

const GITHUB_API: &str = "https://api.github.com";

/// Minimum time between two download progress callbacks
const PROGRESS_THROTTLE_MS: u128 = 100;

/// Information about a published release
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    /// Version string without the `v` prefix
    pub version: String,
    pub tag: String,
    pub release_notes: String,
    pub prerelease: bool,
    pub assets: Vec<ReleaseAsset>,
}

/// A downloadable asset from a release
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    body: Option<String>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
    /// SHA256 digest in format "sha256:hash"
    digest: Option<String>,
}

impl From<GitHubRelease> for ReleaseInfo {
    fn from(release: GitHubRelease) -> Self {
        Self {
            version: release.tag_name.trim_start_matches('v').to_string(),
            tag: release.tag_name,
            release_notes: release.body.unwrap_or_default(),
            prerelease: release.prerelease,
            assets: release.assets.into_iter().map(|a| a.into()).collect(),
        }
    }
}

impl From<GitHubAsset> for ReleaseAsset {
    fn from(asset: GitHubAsset) -> Self {
        let sha256 = asset
            .digest
            .and_then(|d| d.strip_prefix("sha256:").map(|h| h.to_lowercase()));

        Self {
            name: asset.name,
            download_url: asset.browser_download_url,
            size: asset.size,
            sha256,
        }
    }
}

/// File name suffix of the installer built for this platform
pub fn platform_asset_suffix() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "setup.exe"
    }

    #[cfg(target_os = "macos")]
    {
        ".dmg"
    }

    #[cfg(target_os = "linux")]
    {
        ".AppImage"
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        "unknown"
    }
}

/// Find the installer for the current platform
pub fn find_platform_asset(assets: &[ReleaseAsset]) -> Option<&ReleaseAsset> {
    let suffix = platform_asset_suffix();
    assets.iter().find(|a| a.name.ends_with(suffix))
}

/// Where releases come from
#[async_trait]
pub trait UpdateFeed: Send + Sync {
    async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError>;

    /// Download `asset` to `dest`, reporting `(downloaded, total)` bytes
    async fn download(
        &self,
        asset: &ReleaseAsset,
        dest: &Path,
        progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> Result<PathBuf, UpdateError>;
}

/// GitHub releases of `owner/repo`
pub struct GitHubFeed {
    api_base: String,
    owner: String,
    repo: String,
    client: Client,
}

impl GitHubFeed {
    pub fn new(owner: &str, repo: &str) -> Result<Self, UpdateError> {
        Self::with_api_base(GITHUB_API, owner, repo)
    }

    pub fn with_api_base(api_base: &str, owner: &str, repo: &str) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .user_agent(concat!("UNIGRID-Wallet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpdateError::Feed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            client,
        })
    }

    fn latest_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, self.owner, self.repo
        )
    }
}

#[async_trait]
impl UpdateFeed for GitHubFeed {
    async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError> {
        let url = self.latest_url();
        log::info!("Fetching latest release from {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Feed(format!(
                "GitHub API returned status {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let release: GitHubRelease =
            serde_json::from_str(&body).map_err(|e| UpdateError::Malformed(e.to_string()))?;

        Ok(release.into())
    }

    async fn download(
        &self,
        asset: &ReleaseAsset,
        dest: &Path,
        progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> Result<PathBuf, UpdateError> {
        log::info!("Downloading {} to {}", asset.download_url, dest.display());

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let response = self
            .client
            .get(&asset.download_url)
            .send()
            .await
            .map_err(|e| UpdateError::Download(format!("Failed to start download: {}", e)))?;

        if !response.status().is_success() {
            return Err(UpdateError::Download(format!(
                "Download failed with status {}",
                response.status()
            )));
        }

        let total = response.content_length().unwrap_or(asset.size);
        let mut file = File::create(dest)?;
        let result = write_body(response, &mut file, total, progress).await;
        drop(file);

        match result {
            Ok(downloaded) => {
                log::info!("Download complete: {} bytes", downloaded);
                Ok(dest.to_path_buf())
            }
            Err(e) => {
                log::info!("Removing partial download {}", dest.display());
                let _ = std::fs::remove_file(dest);
                Err(e)
            }
        }
    }
}

/// Stream the response body into `file`, reporting progress at most every
/// `PROGRESS_THROTTLE_MS`
async fn write_body(
    response: reqwest::Response,
    file: &mut File,
    total: u64,
    progress: &(dyn Fn(u64, u64) + Send + Sync),
) -> Result<u64, UpdateError> {
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_emit = Instant::now();

    progress(0, total);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UpdateError::Download(e.to_string()))?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;

        if last_emit.elapsed().as_millis() >= PROGRESS_THROTTLE_MS {
            progress(downloaded, total);
            last_emit = Instant::now();
        }
    }

    file.flush()?;
    progress(downloaded, total);
    Ok(downloaded)
}

/// Compute SHA256 hash of a file (lowercase hex)
pub fn compute_file_hash(path: &Path) -> Result<String, UpdateError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file's SHA256 hash against the published value
pub fn verify_file_hash(path: &Path, expected: &str) -> Result<(), UpdateError> {
    let computed = compute_file_hash(path)?;
    let expected = expected.to_lowercase();

    log::info!(
        "Hash verification for {}: computed={}, expected={}",
        path.display(),
        &computed[..16],
        &expected[..16.min(expected.len())]
    );

    if computed != expected {
        return Err(UpdateError::Checksum {
            file: path.display().to_string(),
            expected,
            computed,
        });
    }
    Ok(())
}
