//! Release resolution.
//!
//! Turns a [`SourceConfig`] into a [`ReleaseInfo`]: the version, notes, download URL,
//! size, and checksum of the artifact to install. Resolution is read-only and holds
//! no state between calls, so it can run while a previously resolved release is
//! still downloading.
//!
//! Two kinds of source are supported:
//!
//! - **GitHub**: the latest published release of `owner/repo` (drafts excluded,
//!   pre-releases only on request), or a pinned `release_tag`
//! - **Direct link**: a fixed URL with a declared version; no network access
//!
//! A server can also publish settings that pin a tag or swap in a direct link for
//! every launcher; see [`remote`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use launchkit::config::SourceConfig;
//! use launchkit::release::{ReleaseResolver, ResolverOptions};
//!
//! # async fn example() -> launchkit::core::Result<()> {
//! let resolver = ReleaseResolver::new(ResolverOptions::default())?;
//! let source = SourceConfig::github("example-org", "client-releases", "client.zip");
//! let release = resolver.resolve(&source).await?;
//! println!("{} -> {}", release.version, release.download_url);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod github;
pub(crate) mod http;
pub mod remote;

use crate::config::SourceConfig;
use crate::core::{LauncherError, Result};
use checksum::ChecksumLocation;
use github::{GitHubAsset, GitHubRelease};
use remote::RemoteConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A resolved remote artifact. Created per check, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Version string without a tag prefix (`v1.2.0` becomes `1.2.0`).
    pub version: String,
    pub tag: String,
    pub description: String,
    pub download_url: String,
    pub asset_name: String,
    pub size: Option<u64>,
    /// Lowercase hex SHA-256, when the source publishes one.
    pub checksum: Option<String>,
    /// `download_url` is the API asset endpoint and must be fetched with the bearer token.
    pub authenticated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Base URL of the GitHub API, without a trailing slash.
    pub api_base_url: String,
    /// Bearer token sent with API requests.
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Queries release sources.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: reqwest::Client,
    options: ResolverOptions,
}

impl ReleaseResolver {
    pub fn new(options: ResolverOptions) -> Result<Self> {
        Ok(Self {
            client: http::build_client(&options)?,
            options,
        })
    }

    /// HTTP client shared with the download manager.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Resolve the artifact `source` currently points at.
    ///
    /// # Errors
    ///
    /// - [`LauncherError::NotFound`]: no eligible release, or the asset is missing
    /// - [`LauncherError::RateLimited`]: the API throttled us, with a retry hint
    /// - [`LauncherError::NetworkError`]: connectivity failure or unexpected status
    /// - [`LauncherError::InvalidConfig`]: the source names nothing to resolve
    pub async fn resolve(&self, source: &SourceConfig) -> Result<ReleaseInfo> {
        if let Some(url) = &source.download_url {
            return resolve_direct(source, url);
        }

        let (Some(owner), Some(repo)) = (source.owner.as_deref(), source.repo.as_deref()) else {
            return Err(LauncherError::InvalidConfig {
                message: "no release source configured (set owner/repo or download_url)"
                    .to_string(),
            });
        };
        let asset_name = source.asset_name.as_deref().ok_or_else(|| LauncherError::InvalidConfig {
            message: format!("no asset name configured for {owner}/{repo}"),
        })?;

        let release = match &source.release_tag {
            Some(tag) => self.fetch_tag(owner, repo, tag).await?,
            None => {
                let releases = self.fetch_releases(owner, repo).await?;
                github::select_latest(releases, source.include_prereleases).ok_or_else(|| {
                    LauncherError::NotFound {
                        what: format!("published release in {owner}/{repo}"),
                    }
                })?
            }
        };

        let asset = release.find_asset(asset_name).ok_or_else(|| LauncherError::NotFound {
            what: format!("asset '{}' in release {}", asset_name, release.tag_name),
        })?;

        let checksum = self.discover_checksum(&release, asset).await?;
        if checksum.is_none() {
            warn!(
                "No checksum published for {} in {}; integrity will not be verified",
                asset.name, release.tag_name
            );
        }

        // Private repositories only serve assets through the API endpoint
        let (download_url, authenticated) = match (&self.options.token, &asset.url) {
            (Some(_), Some(api_url)) => (api_url.clone(), true),
            _ => (asset.browser_download_url.clone(), false),
        };

        info!("Resolved {}/{} {} ({})", owner, repo, release.tag_name, asset.name);
        Ok(ReleaseInfo {
            version: strip_tag_prefix(&release.tag_name),
            tag: release.tag_name.clone(),
            description: release.body.clone().unwrap_or_else(|| release.title().to_string()),
            download_url,
            asset_name: asset.name.clone(),
            size: asset.size,
            checksum,
            authenticated,
        })
    }

    /// Fetch and parse the server-published settings at `url`.
    pub async fn fetch_remote_config(&self, url: &str) -> Result<RemoteConfig> {
        let text = self.fetch_text(url, "remote launcher config").await?;
        RemoteConfig::parse(&text)
    }

    async fn fetch_releases(&self, owner: &str, repo: &str) -> Result<Vec<GitHubRelease>> {
        let url = format!("{}/repos/{}/{}/releases", self.options.api_base_url, owner, repo);
        self.get_json(&url, &format!("releases of {owner}/{repo}")).await
    }

    async fn fetch_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<GitHubRelease> {
        let url =
            format!("{}/repos/{}/{}/releases/tags/{}", self.options.api_base_url, owner, repo, tag);
        self.get_json(&url, &format!("release {tag} of {owner}/{repo}")).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        debug!("GET {}", url);
        let mut request = self.client.get(url).header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.options.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LauncherError::network(format!("fetching {what}"), e))?;
        let response = http::check_status(response, what)?;

        response
            .json()
            .await
            .map_err(|e| LauncherError::network(format!("parsing {what}"), e))
    }

    async fn fetch_text(&self, url: &str, what: &str) -> Result<String> {
        debug!("GET {}", url);
        self.read_text(self.client.get(url), what).await
    }

    /// Download a small release asset, through the API when a token is configured.
    async fn fetch_asset_text(&self, asset: &GitHubAsset) -> Result<String> {
        let request = match (&self.options.token, &asset.url) {
            (Some(token), Some(api_url)) => {
                debug!("GET {} (authenticated)", api_url);
                self.client.get(api_url).bearer_auth(token).header("Accept", http::OCTET_STREAM)
            }
            _ => {
                debug!("GET {}", asset.browser_download_url);
                self.client.get(&asset.browser_download_url)
            }
        };
        self.read_text(request, &asset.name).await
    }

    async fn read_text(&self, request: reqwest::RequestBuilder, what: &str) -> Result<String> {
        let response =
            request.send().await.map_err(|e| LauncherError::network(format!("fetching {what}"), e))?;
        http::check_status(response, what)?
            .text()
            .await
            .map_err(|e| LauncherError::network(format!("reading {what}"), e))
    }

    async fn discover_checksum(
        &self,
        release: &GitHubRelease,
        asset: &GitHubAsset,
    ) -> Result<Option<String>> {
        match checksum::locate(release, asset) {
            ChecksumLocation::Inline(digest) => Ok(Some(digest)),
            ChecksumLocation::SidecarFile(file) => {
                let content = self.fetch_asset_text(file).await?;
                Ok(checksum::parse_sidecar(&content))
            }
            ChecksumLocation::Manifest(file) => {
                let content = self.fetch_asset_text(file).await?;
                let digest = checksum::parse_manifest(&content, &asset.name);
                if digest.is_none() {
                    debug!("{} does not list {}", file.name, asset.name);
                }
                Ok(digest)
            }
            ChecksumLocation::Unavailable => Ok(None),
        }
    }
}

fn resolve_direct(source: &SourceConfig, url: &str) -> Result<ReleaseInfo> {
    let version = source.version.clone().ok_or_else(|| LauncherError::InvalidConfig {
        message: format!("direct download {url} has no declared version"),
    })?;

    let asset_name = source.asset_name.clone().unwrap_or_else(|| {
        url.rsplit('/')
            .next()
            .and_then(|segment| segment.split('?').next())
            .filter(|segment| !segment.is_empty())
            .unwrap_or("download")
            .to_string()
    });

    Ok(ReleaseInfo {
        version: strip_tag_prefix(&version),
        tag: version.clone(),
        description: source.description.clone().unwrap_or_default(),
        download_url: url.to_string(),
        asset_name,
        size: None,
        checksum: source.sha256.as_deref().and_then(checksum::normalize),
        authenticated: false,
    })
}

/// Drop a tag prefix such as `v` or `release-`; tags without digits are kept whole.
fn strip_tag_prefix(tag: &str) -> String {
    match tag.find(|c: char| c.is_ascii_digit()) {
        Some(idx) => tag[idx..].to_string(),
        None => tag.to_string(),
    }
}
