//! Static provisioning catalog: applications and the sibling system actions.
//!
//! The catalog is data-driven. A built-in catalog is compiled into the binary
//! from `default_catalog.json`; a config file can point at a replacement with
//! the same shape:
//!
//! ```text
//! {
//!   "applications":    [ ApplicationSpec, ... ],
//!   "services":        [ ServiceDescriptor, ... ],
//!   "registry_tweaks": [ RegistryTweakDescriptor, ... ],
//!   "bloatware":       [ BloatwarePackageDescriptor, ... ]
//! }
//! ```
//!
//! Entries are read-only after loading. Each [`ApplicationSpec`] is processed
//! independently by the engine.

use crate::error::{Result, SetupError};
use serde::{Deserialize, Serialize};
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("default_catalog.json");

/// Minimum similarity before an unknown name gets a "did you mean" hint
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// How an installer file is launched, fixed once from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallerKind {
    Exe,
    Msi,
    MsixBundle,
}

impl InstallerKind {
    /// Map a file extension (with or without the leading dot) to an installer kind.
    ///
    /// Returns `None` for anything the engine cannot launch.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "exe" => Some(Self::Exe),
            "msi" => Some(Self::Msi),
            "msixbundle" => Some(Self::MsixBundle),
            _ => None,
        }
    }

    /// Silent-install arguments used when an entry does not configure its own.
    pub fn default_arguments(self) -> &'static [&'static str] {
        match self {
            Self::Exe => &["/S"],
            Self::Msi => &["/quiet", "/norestart"],
            Self::MsixBundle => &[],
        }
    }
}

/// Where the direct-download URL comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UrlKind {
    /// `url` is the installer itself.
    Static,
    /// `url` is a "latest release" metadata endpoint; the installer is the
    /// first asset whose file name matches `asset_pattern` (`*`/`?` wildcards).
    LatestRelease { asset_pattern: String },
}

/// Direct-download descriptor for one application.
///
/// The installer kind is derived from `extension` when the value is built
/// (or deserialized) and never re-parsed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DirectDownloadDef", into = "DirectDownloadDef")]
pub struct DirectDownload {
    pub url: String,
    pub url_kind: UrlKind,
    pub fallback_url: Option<String>,
    pub install_arguments: Option<Vec<String>>,
    pub verification_paths: Vec<String>,
    pub sha256: Option<String>,
    extension: String,
    installer: Option<InstallerKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DirectDownloadDef {
    url: String,
    #[serde(default = "default_url_kind")]
    url_kind: UrlKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fallback_url: Option<String>,
    extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    install_arguments: Option<Vec<String>>,
    #[serde(default)]
    verification_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
}

fn default_url_kind() -> UrlKind {
    UrlKind::Static
}

impl From<DirectDownloadDef> for DirectDownload {
    fn from(def: DirectDownloadDef) -> Self {
        let mut download = DirectDownload::new(def.url, def.extension);
        download.url_kind = def.url_kind;
        download.fallback_url = def.fallback_url;
        download.install_arguments = def.install_arguments;
        download.verification_paths = def.verification_paths;
        download.sha256 = def.sha256;
        download
    }
}

impl From<DirectDownload> for DirectDownloadDef {
    fn from(download: DirectDownload) -> Self {
        Self {
            url: download.url,
            url_kind: download.url_kind,
            fallback_url: download.fallback_url,
            extension: download.extension,
            install_arguments: download.install_arguments,
            verification_paths: download.verification_paths,
            sha256: download.sha256,
        }
    }
}

impl DirectDownload {
    /// Static download of `url`, launched according to `extension`.
    pub fn new(url: impl Into<String>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let installer = InstallerKind::from_extension(&extension);
        Self {
            url: url.into(),
            url_kind: UrlKind::Static,
            fallback_url: None,
            install_arguments: None,
            verification_paths: Vec::new(),
            sha256: None,
            extension,
            installer,
        }
    }

    /// Resolve the URL through a latest-release endpoint instead.
    pub fn latest_release(
        api_url: impl Into<String>,
        asset_pattern: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        let mut download = Self::new(api_url, extension);
        download.url_kind = UrlKind::LatestRelease {
            asset_pattern: asset_pattern.into(),
        };
        download
    }

    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    pub fn with_arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install_arguments = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_verification_path(mut self, path: impl Into<String>) -> Self {
        self.verification_paths.push(path.into());
        self
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    /// Extension as configured, e.g. `.msi`
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `None` when the extension is not a launchable installer type
    pub fn installer_kind(&self) -> Option<InstallerKind> {
        self.installer
    }

    /// Configured arguments, or the kind's silent defaults.
    pub fn effective_arguments(&self) -> Vec<String> {
        match (&self.install_arguments, self.installer) {
            (Some(args), _) => args.clone(),
            (None, Some(kind)) => kind
                .default_arguments()
                .iter()
                .map(|a| a.to_string())
                .collect(),
            (None, None) => Vec::new(),
        }
    }
}

/// Static per-application descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_download: Option<DirectDownload>,
    /// Display name to look for in the uninstall registry, when it differs from `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_name: Option<String>,
    /// Commands that appear on PATH once the application is installed
    #[serde(default)]
    pub commands: Vec<String>,
}

impl ApplicationSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            package_manager_id: None,
            direct_download: None,
            registry_name: None,
            commands: Vec::new(),
        }
    }

    pub fn with_package_manager_id(mut self, id: impl Into<String>) -> Self {
        self.package_manager_id = Some(id.into());
        self
    }

    pub fn with_direct_download(mut self, download: DirectDownload) -> Self {
        self.direct_download = Some(download);
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    /// At least one install strategy is configured.
    pub fn has_install_method(&self) -> bool {
        self.package_manager_id.is_some() || self.direct_download.is_some()
    }

    /// Configured verification paths, empty when there is no direct download
    pub fn verification_paths(&self) -> &[String] {
        self.direct_download
            .as_ref()
            .map(|d| d.verification_paths.as_slice())
            .unwrap_or(&[])
    }
}

/// Windows release an entry is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsRelease {
    Windows10,
    Windows11,
}

impl OsRelease {
    /// Windows 11 reports build numbers from 22000 up.
    pub fn from_build(build: u32) -> Self {
        if build >= 22000 {
            Self::Windows11
        } else {
            Self::Windows10
        }
    }
}

/// An empty list applies everywhere; an unknown release matches everything too.
fn applies(applies_to: &[OsRelease], release: Option<OsRelease>) -> bool {
    match release {
        Some(release) => applies_to.is_empty() || applies_to.contains(&release),
        None => true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service key name as understood by `sc.exe`
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub applies_to: Vec<OsRelease>,
}

impl ServiceDescriptor {
    pub fn applies_to(&self, release: Option<OsRelease>) -> bool {
        applies(&self.applies_to, release)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RegistryData {
    Dword(u32),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryTweakDescriptor {
    pub name: String,
    /// Full key path including the hive, e.g. `HKCU\Software\...`
    pub path: String,
    pub value: String,
    pub data: RegistryData,
    #[serde(default)]
    pub applies_to: Vec<OsRelease>,
}

impl RegistryTweakDescriptor {
    pub fn applies_to(&self, release: Option<OsRelease>) -> bool {
        applies(&self.applies_to, release)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloatwarePackageDescriptor {
    pub name: String,
    /// AppX package name or `*` wildcard pattern
    pub pattern: String,
    #[serde(default)]
    pub applies_to: Vec<OsRelease>,
}

impl BloatwarePackageDescriptor {
    pub fn applies_to(&self, release: Option<OsRelease>) -> bool {
        applies(&self.applies_to, release)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub applications: Vec<ApplicationSpec>,
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    #[serde(default)]
    pub registry_tweaks: Vec<RegistryTweakDescriptor>,
    #[serde(default)]
    pub bloatware: Vec<BloatwarePackageDescriptor>,
}

impl Catalog {
    /// Catalog compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.warn_unusable();
        Ok(catalog)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load `path` when given, otherwise the built-in catalog.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::builtin(),
        }
    }

    fn warn_unusable(&self) {
        for app in &self.applications {
            if !app.has_install_method() {
                tracing::warn!(app = %app.name, "catalog entry has no install method");
            }
            if let Some(download) = &app.direct_download
                && download.installer_kind().is_none()
            {
                tracing::warn!(
                    app = %app.name,
                    extension = %download.extension(),
                    "catalog entry uses an unsupported installer type"
                );
            }
        }
    }

    /// Case-insensitive lookup by application name or package-manager id.
    pub fn find(&self, name: &str) -> Option<&ApplicationSpec> {
        self.applications.iter().find(|app| {
            app.name.eq_ignore_ascii_case(name)
                || app
                    .package_manager_id
                    .as_deref()
                    .is_some_and(|id| id.eq_ignore_ascii_case(name))
        })
    }

    /// Closest application name, if any is similar enough.
    pub fn suggest(&self, name: &str) -> Option<&str> {
        let needle = name.to_lowercase();
        self.applications
            .iter()
            .map(|app| {
                let score = strsim::jaro_winkler(&needle, &app.name.to_lowercase());
                (score, app.name.as_str())
            })
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, name)| name)
    }

    /// Resolve a list of names, failing on the first unknown one.
    pub fn select(&self, names: &[String]) -> Result<Vec<ApplicationSpec>> {
        names
            .iter()
            .map(|name| {
                self.find(name).cloned().ok_or_else(|| SetupError::UnknownApp {
                    name: name.clone(),
                    suggestion: self.suggest(name).map(str::to_string),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = Catalog::builtin().unwrap();
        assert!(!catalog.applications.is_empty());
        assert!(!catalog.services.is_empty());
        assert!(!catalog.registry_tweaks.is_empty());
        assert!(!catalog.bloatware.is_empty());
        assert!(catalog.applications.iter().all(|a| a.has_install_method()));
    }

    #[test]
    fn test_builtin_catalog_installers_are_supported() {
        let catalog = Catalog::builtin().unwrap();
        for app in &catalog.applications {
            if let Some(download) = &app.direct_download {
                assert!(
                    download.installer_kind().is_some(),
                    "{} has unsupported extension {}",
                    app.name,
                    download.extension()
                );
            }
        }
    }

    #[test]
    fn test_installer_kind_from_extension() {
        assert_eq!(InstallerKind::from_extension(".exe"), Some(InstallerKind::Exe));
        assert_eq!(InstallerKind::from_extension("MSI"), Some(InstallerKind::Msi));
        assert_eq!(
            InstallerKind::from_extension(".msixbundle"),
            Some(InstallerKind::MsixBundle)
        );
        assert_eq!(InstallerKind::from_extension(".zip"), None);
        assert_eq!(InstallerKind::from_extension(""), None);
    }

    #[test]
    fn test_effective_arguments_defaults() {
        let exe = DirectDownload::new("https://example.com/a.exe", ".exe");
        assert_eq!(exe.effective_arguments(), vec!["/S"]);

        let msi = DirectDownload::new("https://example.com/a.msi", ".msi");
        assert_eq!(msi.effective_arguments(), vec!["/quiet", "/norestart"]);

        let custom = DirectDownload::new("https://example.com/a.exe", ".exe")
            .with_arguments(["/VERYSILENT"]);
        assert_eq!(custom.effective_arguments(), vec!["/VERYSILENT"]);
    }

    #[test]
    fn test_direct_download_deserialize_resolves_kind() {
        let json = r#"{
            "url": "https://api.github.com/repos/o/r/releases/latest",
            "url_kind": { "kind": "latest_release", "asset_pattern": "*.msi" },
            "extension": ".msi"
        }"#;
        let download: DirectDownload = serde_json::from_str(json).unwrap();
        assert_eq!(download.installer_kind(), Some(InstallerKind::Msi));
        assert_eq!(
            download.url_kind,
            UrlKind::LatestRelease {
                asset_pattern: "*.msi".to_string()
            }
        );

        let back = serde_json::to_value(&download).unwrap();
        assert_eq!(back["extension"], ".msi");
    }

    #[test]
    fn test_find_by_name_and_id() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.find("git").unwrap().name, "Git");
        assert_eq!(catalog.find("Mozilla.Firefox").unwrap().name, "Mozilla Firefox");
        assert!(catalog.find("definitely-not-an-app").is_none());
    }

    #[test]
    fn test_select_unknown_suggests() {
        let catalog = Catalog::builtin().unwrap();
        let err = catalog
            .select(&["Notepad+".to_string()])
            .unwrap_err();
        match err {
            SetupError::UnknownApp { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("Notepad++"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_os_applicability() {
        assert_eq!(OsRelease::from_build(19045), OsRelease::Windows10);
        assert_eq!(OsRelease::from_build(22631), OsRelease::Windows11);

        let tweak = RegistryTweakDescriptor {
            name: "left taskbar".to_string(),
            path: "HKCU\\X".to_string(),
            value: "TaskbarAl".to_string(),
            data: RegistryData::Dword(0),
            applies_to: vec![OsRelease::Windows11],
        };
        assert!(tweak.applies_to(Some(OsRelease::Windows11)));
        assert!(!tweak.applies_to(Some(OsRelease::Windows10)));
        assert!(tweak.applies_to(None));
    }
}
