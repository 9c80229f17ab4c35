//! Server-published launcher settings.
//!
//! A game server can publish a small document next to its releases that steers
//! every launcher without a local config change:
//!
//! ```json
//! {
//!   "release_tag": "v2.1.0",
//!   "protected_folders": ["minimap", "conf", "screenshots"]
//! }
//! ```
//!
//! or, for a client hosted outside GitHub:
//!
//! ```json
//! {
//!   "download_url": "https://cdn.example.org/client-2.1.0.zip",
//!   "version": "2.1.0",
//!   "description": "Summer event client"
//! }
//! ```
//!
//! Plain `key=value` lines are accepted as well; there `protected_folders` is a
//! comma-separated list.

use crate::config::SourceConfig;
use crate::core::{LauncherError, Result};
use crate::protection::ProtectionSet;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Folder list given either as an array or as one comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FolderList {
    List(Vec<String>),
    Joined(String),
}

impl FolderList {
    pub fn entries(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::Joined(joined) => joined.split(',').collect(),
        };
        raw.into_iter().map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub release_tag: Option<String>,
    pub version: Option<String>,
    pub current_version: Option<String>,
    pub download_url: Option<String>,
    pub download_link: Option<String>,
    /// Asset to pick from a pinned release.
    pub zip_file: Option<String>,
    pub description: Option<String>,
    pub sha256: Option<String>,
    pub protected_folders: Option<FolderList>,
}

impl RemoteConfig {
    /// Parse a JSON object, falling back to `key=value` lines.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Ok(config) = serde_json::from_str::<Self>(text) {
            return Ok(config);
        }

        let mut fields = Map::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"');
                fields.insert(key.trim().to_string(), Value::String(value.to_string()));
            }
        }
        if fields.is_empty() {
            return Err(LauncherError::InvalidConfig {
                message: "remote config is neither a JSON object nor key=value lines".to_string(),
            });
        }

        serde_json::from_value(Value::Object(fields)).map_err(|e| LauncherError::InvalidConfig {
            message: format!("remote config: {e}"),
        })
    }

    fn declared_version(&self) -> Option<&str> {
        [&self.version, &self.current_version, &self.release_tag]
            .into_iter()
            .find_map(|v| non_empty(v.as_deref()))
    }

    fn direct_link(&self) -> Option<&str> {
        non_empty(self.download_url.as_deref()).or_else(|| non_empty(self.download_link.as_deref()))
    }

    /// The client source with the published pin or direct link applied.
    ///
    /// A direct link wins over a tag; a bare version pins the release tagged with it.
    pub fn apply_to(&self, local: &SourceConfig) -> SourceConfig {
        let mut source = local.clone();

        if let Some(url) = self.direct_link() {
            source.download_url = Some(url.to_string());
            source.version = self.declared_version().map(String::from);
            source.asset_name = Some(
                non_empty(self.zip_file.as_deref())
                    .map(String::from)
                    .unwrap_or_else(|| archive_name(url)),
            );
            source.sha256 = self.sha256.clone();
            if self.description.is_some() {
                source.description = self.description.clone();
            }
            return source;
        }

        let pin = non_empty(self.release_tag.as_deref())
            .or_else(|| non_empty(self.version.as_deref()))
            .or_else(|| non_empty(self.current_version.as_deref()));
        if let Some(tag) = pin {
            source.release_tag = Some(tag.to_string());
        }
        if let Some(asset) = non_empty(self.zip_file.as_deref()) {
            source.asset_name = Some(asset.to_string());
        }
        source
    }

    /// Local protected folders plus the published ones.
    ///
    /// # Errors
    ///
    /// [`LauncherError::InvalidProtectedPath`] when a published folder is unsafe.
    pub fn protection_set(&self, local: &ProtectionSet) -> Result<ProtectionSet> {
        let local_entries = local.paths().iter().map(|p| p.to_string_lossy().into_owned());
        let published = self.protected_folders.as_ref().map(FolderList::entries).unwrap_or_default();
        ProtectionSet::new(local_entries.chain(published))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// File name of a direct link, or `client.zip` when it does not name a zip.
fn archive_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| name.to_ascii_lowercase().ends_with(".zip"))
        .unwrap_or("client.zip")
        .to_string()
}
