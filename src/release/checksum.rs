//! Locating the published SHA-256 of a release asset.
//!
//! Lookup order:
//! 1. the asset's own `digest` field (`sha256:<hex>`)
//! 2. a sibling asset named `<asset>.sha256`
//! 3. a `checksums.txt` / `SHA256SUMS` asset with `<hex>  <name>` lines
//!
//! When none of these exist the checksum is unknown and verification is skipped.

use super::github::{GitHubAsset, GitHubRelease};

const MANIFEST_NAMES: &[&str] = &["checksums.txt", "sha256sums", "sha256sums.txt"];

/// Where the checksum for an asset can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChecksumLocation<'a> {
    Inline(String),
    /// A `<asset>.sha256` file holding just the digest.
    SidecarFile(&'a GitHubAsset),
    /// A multi-line manifest listing several assets.
    Manifest(&'a GitHubAsset),
    Unavailable,
}

pub(crate) fn locate<'a>(release: &'a GitHubRelease, asset: &GitHubAsset) -> ChecksumLocation<'a> {
    if let Some(digest) = asset.digest.as_deref().and_then(normalize) {
        return ChecksumLocation::Inline(digest);
    }

    let sidecar = format!("{}.sha256", asset.name);
    if let Some(file) = release.assets.iter().find(|a| a.name.eq_ignore_ascii_case(&sidecar)) {
        return ChecksumLocation::SidecarFile(file);
    }

    if let Some(file) = release
        .assets
        .iter()
        .find(|a| MANIFEST_NAMES.iter().any(|name| a.name.eq_ignore_ascii_case(name)))
    {
        return ChecksumLocation::Manifest(file);
    }

    ChecksumLocation::Unavailable
}

/// Lowercase hex digest from `sha256:<hex>` or bare `<hex>`; `None` if malformed.
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let hex = match trimmed.split_once(':') {
        Some((algo, hex)) if algo.eq_ignore_ascii_case("sha256") => hex,
        Some(_) => return None,
        None => trimmed,
    };
    let hex = hex.trim().to_ascii_lowercase();
    (hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())).then_some(hex)
}

/// Digest from a `.sha256` sidecar (`<hex>` optionally followed by a file name).
pub(crate) fn parse_sidecar(content: &str) -> Option<String> {
    content.split_whitespace().next().and_then(normalize)
}

/// Digest for `asset_name` from `sha256sum`-style output.
pub(crate) fn parse_manifest(content: &str, asset_name: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let hex = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        (name == asset_name).then(|| normalize(hex)).flatten()
    })
}
