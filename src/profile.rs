//! Saved provisioning profiles.
//!
//! A profile is a JSON file naming the applications to install and which
//! sibling operations to run, so the same machine setup can be replayed.

use crate::catalog::Catalog;
use crate::error::{Result, SetupError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub apps: Vec<String>,
    #[serde(default)]
    pub disable_services: bool,
    #[serde(default)]
    pub remove_bloatware: bool,
    #[serde(default)]
    pub apply_tweaks: bool,
    #[serde(default)]
    pub parallel: bool,
}

impl Profile {
    /// Profile selecting every catalog application and every sibling operation.
    pub fn from_catalog(name: impl Into<String>, catalog: &Catalog) -> Self {
        Self {
            name: name.into(),
            apps: catalog.applications.iter().map(|a| a.name.clone()).collect(),
            disable_services: true,
            remove_bloatware: true,
            apply_tweaks: true,
            parallel: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let profile: Profile = serde_json::from_str(&content)?;
        if profile.name.trim().is_empty() {
            return Err(SetupError::ConfigError(format!(
                "profile {} has no name",
                path.display()
            )));
        }
        Ok(profile)
    }

    /// Write the profile as pretty JSON, refusing to overwrite an existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(SetupError::ConfigError(format!(
                "{} already exists",
                path.display()
            )));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
