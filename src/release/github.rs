//! GitHub Releases API payloads and release selection.

use crate::version::Version;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    /// API endpoint of the asset; serves the bytes to authenticated requests on private repos.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    /// `sha256:<hex>`, present on assets uploaded after GitHub started hashing them.
    #[serde(default)]
    pub digest: Option<String>,
}

impl GitHubRelease {
    pub fn find_asset(&self, name: &str) -> Option<&GitHubAsset> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Release title, falling back to the tag.
    pub fn title(&self) -> &str {
        self.name.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or(&self.tag_name)
    }
}

/// Pick the highest-versioned published release.
///
/// Drafts are never eligible; pre-releases only when `include_prereleases`.
pub fn select_latest(releases: Vec<GitHubRelease>, include_prereleases: bool) -> Option<GitHubRelease> {
    releases
        .into_iter()
        .filter(|r| !r.draft && (include_prereleases || !r.prerelease))
        .fold(None, |best: Option<(Version, GitHubRelease)>, release| {
            let version = Version::parse(&release.tag_name);
            match best {
                Some((best_version, best_release)) if best_version >= version => {
                    Some((best_version, best_release))
                }
                _ => Some((version, release)),
            }
        })
        .map(|(_, release)| release)
}
