//! User configuration.
//!
//! Configuration is a JSON file in which every field is optional. It is looked
//! up in this order:
//!
//! 1. an explicit path (the `--config` flag)
//! 2. `WINSETUP_CONFIG`
//! 3. `%APPDATA%\winsetup\config.json`, `$XDG_CONFIG_HOME/winsetup/config.json`
//!    or `$HOME/.config/winsetup/config.json`, whichever base is set first
//!
//! An explicit path that does not exist is an error. A missing file at the
//! default location yields the defaults.

use crate::error::{Result, SetupError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_ENV_VAR: &str = "WINSETUP_CONFIG";
const CONFIG_DIR_NAME: &str = "winsetup";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per application, including the first
    pub attempts: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 1,
            initial_delay_secs: 5,
            max_delay_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub installer_timeout_secs: u64,
    pub network_timeout_secs: u64,
    pub query_timeout_secs: u64,
    /// Package manager executable
    pub package_manager: String,
    /// Skip the package-manager phase entirely
    pub direct_download_only: bool,
    /// Allow the package manager's second attempt with hash validation off
    pub allow_hash_override: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Catalog JSON replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
    pub retry: RetrySettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            installer_timeout_secs: 300,
            network_timeout_secs: 15,
            query_timeout_secs: 60,
            package_manager: "winget".to_string(),
            direct_download_only: false,
            allow_hash_override: true,
            scratch_dir: None,
            log_file: None,
            catalog: None,
            retry: RetrySettings::default(),
            max_parallel: None,
            show_progress: true,
        }
    }
}

impl Config {
    /// Load configuration following the lookup order above.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "loading configuration from --config");
            return Self::from_path(path);
        }

        if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            debug!(path = %path.display(), "loading configuration from {}", CONFIG_ENV_VAR);
            return Self::from_path(&path);
        }

        match default_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading configuration");
                Self::from_path(&path)
            }
            _ => {
                debug!("no configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SetupError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.installer_timeout_secs == 0 {
            return Err(SetupError::ConfigError(
                "installer_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.network_timeout_secs == 0 || self.query_timeout_secs == 0 {
            return Err(SetupError::ConfigError(
                "network and query timeouts must be greater than zero".to_string(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(SetupError::ConfigError(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.max_parallel == Some(0) {
            return Err(SetupError::ConfigError(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.package_manager.trim().is_empty() {
            return Err(SetupError::ConfigError(
                "package_manager must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn installer_timeout(&self) -> Duration {
        Duration::from_secs(self.installer_timeout_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Root under which per-application scratch directories are created
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| env::temp_dir().join(CONFIG_DIR_NAME))
    }
}

/// Default config file location for this user
pub fn default_path() -> Option<PathBuf> {
    default_path_with(|name| env::var(name).ok())
}

fn default_path_with<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

    let base = non_empty("APPDATA")
        .map(PathBuf::from)
        .or_else(|| non_empty("XDG_CONFIG_HOME").map(PathBuf::from))
        .or_else(|| non_empty("HOME").map(|home| PathBuf::from(home).join(".config")))?;

    Some(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
