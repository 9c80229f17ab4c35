//! Launcher configuration.
//!
//! The configuration is a single TOML file. Every option has a documented default so
//! an empty (or missing) file yields a working launcher once a client source is
//! filled in.
//!
//! # Location
//!
//! 1. `--config <path>` on the command line
//! 2. `LAUNCHKIT_CONFIG_PATH` environment variable
//! 3. `<config_dir>/launchkit/config.toml` (platform config directory via `dirs`)
//!
//! # Example
//!
//! ```toml
//! server_name = "Example Realm"
//! install_root = "/games/example"
//! protected_folders = ["minimap", "conf", "characterdata"]
//! check_interval_secs = 7200
//!
//! [client]
//! owner = "example-org"
//! repo = "client-releases"
//! asset_name = "client.zip"
//!
//! [launcher]
//! owner = "example-org"
//! repo = "launcher"
//! asset_name = "launchkit.exe"
//! ```
//!
//! `remote_config_url` points at settings the server publishes for every launcher
//! (a pinned `release_tag` or direct link, extra `protected_folders`).
//!
//! A client published outside GitHub uses a direct link instead:
//!
//! ```toml
//! [client]
//! download_url = "https://cdn.example.org/client-1.4.0.zip"
//! version = "1.4.0"
//! sha256 = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
//! ```

use crate::core::LauncherError;
use crate::protection::ProtectionSet;
use crate::release::ResolverOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "LAUNCHKIT_CONFIG_PATH";

const DEFAULT_CLIENT_ASSET: &str = "client.zip";
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Where one artifact (client archive or launcher binary) is published.
///
/// Either a GitHub repository (`owner` + `repo` + `asset_name`) or a fixed
/// `download_url` with a declared `version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_name: Option<String>,
    pub include_prereleases: bool,
    /// Pin a specific release tag instead of following the latest release.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl SourceConfig {
    /// GitHub repository source.
    pub fn github(owner: impl Into<String>, repo: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            repo: Some(repo.into()),
            asset_name: Some(asset.into()),
            ..Self::default()
        }
    }

    /// Direct-link source with a declared version.
    pub fn direct(url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            download_url: Some(url.into()),
            version: Some(version.into()),
            ..Self::default()
        }
    }

    pub fn is_direct(&self) -> bool {
        self.download_url.is_some()
    }

    /// Short label for logs and status output.
    pub fn describe(&self) -> String {
        match (&self.download_url, &self.owner, &self.repo) {
            (Some(url), _, _) => url.clone(),
            (None, Some(owner), Some(repo)) => format!("{owner}/{repo}"),
            _ => "<not configured>".to_string(),
        }
    }

    fn validate(&self, label: &str) -> std::result::Result<(), LauncherError> {
        let invalid = |message: String| LauncherError::InvalidConfig {
            message,
        };

        if self.is_direct() {
            if self.version.as_deref().is_none_or(|v| v.trim().is_empty()) {
                return Err(invalid(format!("[{label}] download_url requires a version")));
            }
            return Ok(());
        }

        match (self.owner.as_deref(), self.repo.as_deref()) {
            (None, None) => Ok(()),
            (Some(owner), Some(repo)) if !owner.trim().is_empty() && !repo.trim().is_empty() => {
                if self.asset_name.as_deref().is_some_and(|a| a.trim().is_empty()) {
                    return Err(invalid(format!("[{label}] asset_name must not be empty")));
                }
                Ok(())
            }
            _ => Err(invalid(format!("[{label}] owner and repo must both be set"))),
        }
    }
}

/// Every recognized launcher option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Display name of the game server.
    pub server_name: String,

    /// Game client install directory. Defaults to `<data_dir>/launchkit/client`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_root: Option<PathBuf>,

    /// Directory for state files, quarantines, and locks. Defaults to `<data_dir>/launchkit`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    pub client: SourceConfig,

    /// Self-update source. Self-update is disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launcher: Option<SourceConfig>,

    /// Version of the running launcher. Defaults to the crate version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launcher_version: Option<String>,

    /// Bearer token for the release API and for assets of private repositories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Server-published settings read before every client check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_config_url: Option<String>,

    pub api_base_url: String,

    /// Folders under the install root preserved across updates.
    pub protected_folders: Vec<String>,

    /// Seconds between background checks. `0` disables the recurring timer.
    pub check_interval_secs: u64,

    /// Enables recurring background checks.
    pub auto_update: bool,

    /// Install client updates without asking.
    pub unattended_install: bool,

    /// Install launcher updates without asking.
    pub unattended_self_install: bool,

    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            server_name: "Game Server".to_string(),
            install_root: None,
            state_dir: None,
            client: SourceConfig::default(),
            launcher: None,
            launcher_version: None,
            token: None,
            remote_config_url: None,
            api_base_url: DEFAULT_API_BASE.to_string(),
            protected_folders: vec![
                "minimap".to_string(),
                "conf".to_string(),
                "characterdata".to_string(),
            ],
            check_interval_secs: 7200,
            auto_update: true,
            unattended_install: false,
            unattended_self_install: false,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

impl LauncherConfig {
    /// Load from `LAUNCHKIT_CONFIG_PATH` or the default location.
    ///
    /// A missing file yields the defaults.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, otherwise as [`load`](Self::load) does.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => match std::env::var_os(CONFIG_PATH_ENV) {
                Some(env_path) => PathBuf::from(env_path),
                None => Self::default_path()?,
            },
        };

        if path.exists() {
            Self::load_from(&path).await
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load and validate a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `<config_dir>/launchkit/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine configuration directory"))?;
        Ok(base.join("launchkit").join("config.toml"))
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> std::result::Result<(), LauncherError> {
        self.protection_set()?;
        self.client.validate("client")?;
        if let Some(launcher) = &self.launcher {
            launcher.validate("launcher")?;
        }

        if !is_http_url(&self.api_base_url) {
            return Err(LauncherError::InvalidConfig {
                message: format!("api_base_url must be an http(s) URL: {}", self.api_base_url),
            });
        }

        if let Some(url) = &self.remote_config_url
            && !is_http_url(url)
        {
            return Err(LauncherError::InvalidConfig {
                message: format!("remote_config_url must be an http(s) URL: {url}"),
            });
        }

        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(LauncherError::InvalidConfig {
                message: "network timeouts must be greater than zero".to_string(),
            });
        }

        let root = self.install_root();
        let state = self.state_dir();
        if state.starts_with(&root) {
            return Err(LauncherError::InvalidConfig {
                message: format!(
                    "state_dir {} must not be inside install_root {}",
                    state.display(),
                    root.display()
                ),
            });
        }

        Ok(())
    }

    pub fn install_root(&self) -> PathBuf {
        self.install_root.clone().unwrap_or_else(|| data_base().join("client"))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(data_base)
    }

    /// Recurring check period, or `None` when background checks are off.
    pub fn check_interval(&self) -> Option<Duration> {
        (self.auto_update && self.check_interval_secs > 0)
            .then(|| Duration::from_secs(self.check_interval_secs))
    }

    pub fn protection_set(&self) -> std::result::Result<ProtectionSet, LauncherError> {
        ProtectionSet::new(&self.protected_folders)
    }

    /// Client source with the default asset name applied.
    ///
    /// A bare asset name gets `.zip` appended.
    pub fn client_source(&self) -> SourceConfig {
        let mut source = self.client.clone();
        let asset = source.asset_name.take().unwrap_or_else(|| DEFAULT_CLIENT_ASSET.to_string());
        source.asset_name = Some(if asset.contains('.') {
            asset
        } else {
            format!("{asset}.zip")
        });
        source
    }

    /// Launcher source with the platform executable name as default asset.
    pub fn launcher_source(&self) -> Option<SourceConfig> {
        self.launcher.clone().map(|mut source| {
            if source.asset_name.is_none() {
                source.asset_name = Some(format!("launchkit{}", std::env::consts::EXE_SUFFIX));
            }
            source
        })
    }

    pub fn launcher_version(&self) -> String {
        self.launcher_version.clone().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            api_base_url: self.api_base_url.trim_end_matches('/').to_string(),
            token: self.token.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn data_base() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("launchkit")
}
