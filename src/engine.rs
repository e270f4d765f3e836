//! Application Installation Engine.
//!
//! [`Engine::install`] takes one [`ApplicationSpec`] through an ordered list
//! of strategies, first success wins:
//!
//! 1. already-installed check through the [`Verifier`]
//! 2. package-manager install, when an id is configured and the manager is callable
//! 3. direct download: resolve, download to a per-app scratch directory, launch
//!    the installer by [`InstallerKind`] under a bounded timeout
//! 4. verification of the direct install
//!
//! An installer that ran but could not be verified is reported as a soft
//! success: `succeeded` is true and the result carries
//! [`FailureKind::VerificationFailed`] with the detail `verification failed`.
//! Verification heuristics miss real installs often enough that failing hard
//! there would misreport more than it protects.
//!
//! `install` never returns an error. Every failure ends up in the returned
//! [`InstallAttemptResult`].

use crate::catalog::{ApplicationSpec, DirectDownload, InstallerKind};
use crate::config::Config;
use crate::error::{FailureKind, InstallError, Result, SetupError};
use crate::package_manager::PackageManager;
use crate::process::{CommandRunner, Invocation, ProcessOutcome, ProcessOutput, SystemRunner};
use crate::registry::{SystemRegistry, UninstallRegistry};
use crate::resolver::DownloadResolver;
use crate::system;
use crate::transport::{self, HttpTransport, Transport};
use crate::verifier::{VerificationHints, Verifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which strategy produced (or last attempted) the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallMethod {
    PackageManager,
    DirectDownload,
    AlreadyInstalled,
    None,
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PackageManager => "package manager",
            Self::DirectDownload => "direct download",
            Self::AlreadyInstalled => "already installed",
            Self::None => "none",
        };
        f.write_str(label)
    }
}

/// Outcome of one installation request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallAttemptResult {
    app_name: String,
    method_used: InstallMethod,
    succeeded: bool,
    failure: Option<FailureKind>,
    error_detail: Option<String>,
    timestamp: DateTime<Utc>,
}

impl InstallAttemptResult {
    pub fn success(app_name: impl Into<String>, method: InstallMethod) -> Self {
        Self {
            app_name: app_name.into(),
            method_used: method,
            succeeded: true,
            failure: None,
            error_detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn already_installed(app_name: impl Into<String>) -> Self {
        Self::success(app_name, InstallMethod::AlreadyInstalled)
    }

    /// Installer ran, verification found nothing.
    pub fn soft_success(app_name: impl Into<String>, method: InstallMethod) -> Self {
        let error = InstallError::VerificationFailed;
        Self {
            failure: Some(error.kind()),
            error_detail: Some(error.to_string()),
            ..Self::success(app_name, method)
        }
    }

    pub fn failed(app_name: impl Into<String>, method: InstallMethod, error: &InstallError) -> Self {
        Self {
            app_name: app_name.into(),
            method_used: method,
            succeeded: false,
            failure: Some(error.kind()),
            error_detail: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn method_used(&self) -> InstallMethod {
        self.method_used
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Succeeded, but the install could not be confirmed
    pub fn is_soft_success(&self) -> bool {
        self.succeeded && self.failure == Some(FailureKind::VerificationFailed)
    }
}

/// Anything that can run the install sequence for one application
#[async_trait]
pub trait AppInstaller: Send + Sync {
    async fn install(&self, app: &ApplicationSpec, cancel: &CancellationToken)
    -> InstallAttemptResult;
}

/// Explicit engine configuration, usually derived from [`Config`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub installer_timeout: Duration,
    pub query_timeout: Duration,
    pub package_manager: String,
    pub direct_download_only: bool,
    pub allow_hash_override: bool,
    pub scratch_root: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            installer_timeout: config.installer_timeout(),
            query_timeout: config.query_timeout(),
            package_manager: config.package_manager.clone(),
            direct_download_only: config.direct_download_only,
            allow_hash_override: config.allow_hash_override,
            scratch_root: config.scratch_root(),
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    settings: EngineSettings,
    runner: Arc<dyn CommandRunner>,
    transport: Arc<dyn Transport>,
    resolver: DownloadResolver,
    package_manager: PackageManager,
    verifier: Verifier,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn Transport>,
        registry: Arc<dyn UninstallRegistry>,
    ) -> Self {
        let package_manager = PackageManager::new(runner.clone(), settings.package_manager.clone())
            .with_timeouts(settings.installer_timeout, settings.query_timeout)
            .with_hash_override(settings.allow_hash_override);
        let verifier = Verifier::new(Some(package_manager.clone()), registry, runner.clone());
        let resolver = DownloadResolver::new(transport.clone());

        Self {
            settings,
            runner,
            transport,
            resolver,
            package_manager,
            verifier,
        }
    }

    /// Engine wired to the real system: child processes, HTTP, registry.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config.network_timeout(), config.show_progress)
            .map_err(|e| SetupError::Other(e.into()))?;
        Ok(Self::new(
            EngineSettings::from(config),
            Arc::new(SystemRunner::new()),
            Arc::new(transport),
            Arc::new(SystemRegistry),
        ))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    fn package_manager_usable(&self, app: &ApplicationSpec) -> bool {
        !self.settings.direct_download_only
            && app.package_manager_id.is_some()
            && self.package_manager.is_available()
    }

    /// Run the install sequence for `app`.
    pub async fn install(
        &self,
        app: &ApplicationSpec,
        cancel: &CancellationToken,
    ) -> InstallAttemptResult {
        let name = app.name.as_str();
        let package_manager_usable = self.package_manager_usable(app);

        if !package_manager_usable && app.direct_download.is_none() {
            warn!(app = %name, "no usable install method");
            return InstallAttemptResult::failed(
                name,
                InstallMethod::None,
                &InstallError::NoInstallMethodAvailable,
            );
        }

        if cancel.is_cancelled() {
            return InstallAttemptResult::failed(name, InstallMethod::None, &InstallError::Cancelled);
        }

        let hints = VerificationHints::for_app(app);
        let existing = self.verifier.verify(name, &hints, cancel).await;
        if existing.installed() {
            info!(app = %name, matched_by = ?existing.matched_by, "already installed");
            return InstallAttemptResult::already_installed(name);
        }

        let mut method = InstallMethod::None;
        let mut last_error = InstallError::NoInstallMethodAvailable;

        if package_manager_usable && let Some(id) = &app.package_manager_id {
            if cancel.is_cancelled() {
                return InstallAttemptResult::failed(name, method, &InstallError::Cancelled);
            }
            method = InstallMethod::PackageManager;

            match self.package_manager.install(id, cancel).await {
                Ok(outcome) => {
                    info!(
                        app = %name,
                        exit_code = ?outcome.exit_code,
                        matched_success_text = outcome.matched_success_text,
                        "installed with package manager"
                    );
                    return InstallAttemptResult::success(name, method);
                }
                Err(InstallError::Cancelled) => {
                    return InstallAttemptResult::failed(name, method, &InstallError::Cancelled);
                }
                Err(e) => {
                    warn!(app = %name, error = %e, "package manager phase failed");
                    last_error = e;
                }
            }
        }

        if let Some(download) = &app.direct_download {
            if cancel.is_cancelled() {
                return InstallAttemptResult::failed(name, method, &InstallError::Cancelled);
            }
            method = InstallMethod::DirectDownload;

            match self.direct_install(app, download, cancel).await {
                Ok(verification_paths) => {
                    let hints = VerificationHints {
                        paths: verification_paths,
                        ..hints
                    };
                    let verification = self.verifier.verify(name, &hints, cancel).await;
                    if verification.installed() {
                        info!(app = %name, matched_by = ?verification.matched_by, "installed and verified");
                        return InstallAttemptResult::success(name, method);
                    }
                    warn!(app = %name, "installer finished but the install could not be verified");
                    return InstallAttemptResult::soft_success(name, method);
                }
                Err(InstallError::Cancelled) => {
                    return InstallAttemptResult::failed(name, method, &InstallError::Cancelled);
                }
                Err(e) => {
                    warn!(app = %name, error = %e, "direct download phase failed");
                    last_error = e;
                }
            }
        }

        InstallAttemptResult::failed(name, method, &last_error)
    }

    /// Resolve, download and launch. Returns the verification paths to check.
    async fn direct_install(
        &self,
        app: &ApplicationSpec,
        download: &DirectDownload,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<String>, InstallError> {
        let name = app.name.as_str();
        let kind = download
            .installer_kind()
            .ok_or_else(|| InstallError::UnsupportedInstallerType(download.extension().to_string()))?;

        let resolved = self.resolver.resolve(name, download).await?;
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        let scratch = ScratchDir::create(&self.settings.scratch_root, name)
            .map_err(|e| InstallError::DownloadFailed(format!("cannot create scratch directory: {e}")))?;
        let installer_path = scratch.path().join(format!(
            "{}-installer.{}",
            slug(name),
            resolved.extension.trim_start_matches('.').to_ascii_lowercase()
        ));

        info!(app = %name, url = %resolved.url, source = ?resolved.source, "downloading installer");
        let bytes = self
            .transport
            .download(&resolved.url, &installer_path)
            .await
            .map_err(|e| InstallError::DownloadFailed(e.to_string()))?;
        debug!(app = %name, bytes, path = %installer_path.display(), "installer downloaded");

        if let Some(expected) = &resolved.sha256 {
            let actual = transport::sha256_file(&installer_path)
                .await
                .map_err(|e| InstallError::DownloadFailed(format!("cannot hash installer: {e}")))?;
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(InstallError::DownloadFailed(format!(
                    "checksum mismatch: expected {expected}, got {actual}"
                )));
            }
        }

        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        self.launch(app, kind, &installer_path, &resolved.install_arguments, cancel)
            .await?;
        self.runner.refresh_environment();

        Ok(resolved.verification_paths)
    }

    async fn launch(
        &self,
        app: &ApplicationSpec,
        kind: InstallerKind,
        installer: &Path,
        arguments: &[String],
        cancel: &CancellationToken,
    ) -> std::result::Result<(), InstallError> {
        let name = app.name.as_str();
        let invocation = installer_invocation(kind, installer, arguments);
        info!(app = %name, ?kind, command = %invocation, "running installer");

        match kind {
            InstallerKind::Exe | InstallerKind::Msi => {
                let output = self.run_installer(&invocation, cancel).await?;
                if !output.success() {
                    // Exit codes are unreliable for these installers; verification decides.
                    warn!(app = %name, exit_code = ?output.exit_code, "installer exited non-zero");
                }
                Ok(())
            }
            InstallerKind::MsixBundle => {
                let failure = match self.run_installer(&invocation, cancel).await {
                    Ok(output) if output.success() => return Ok(()),
                    Ok(output) => InstallError::InstallerLaunchFailed(format!(
                        "package registration failed: {}",
                        output.summary()
                    )),
                    Err(e @ InstallError::InstallerLaunchFailed(_)) => e,
                    Err(e) => return Err(e),
                };

                // The full escalation already ran in the package-manager phase.
                match &app.package_manager_id {
                    Some(id) if self.package_manager_usable(app) => {
                        warn!(app = %name, error = %failure, "registration failed, trying package manager");
                        self.package_manager
                            .install_standard(id, cancel)
                            .await
                            .map(|_| ())
                    }
                    _ => Err(failure),
                }
            }
        }
    }

    async fn run_installer(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> std::result::Result<ProcessOutput, InstallError> {
        match self
            .runner
            .run(invocation, self.settings.installer_timeout, cancel)
            .await
        {
            Ok(ProcessOutcome::Exited(output)) => Ok(output),
            Ok(ProcessOutcome::TimedOut) => {
                Err(InstallError::InstallerTimedOut(self.settings.installer_timeout))
            }
            Ok(ProcessOutcome::Cancelled) => Err(InstallError::Cancelled),
            Err(e) => Err(InstallError::InstallerLaunchFailed(format!(
                "{}: {}",
                invocation.program.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl AppInstaller for Engine {
    async fn install(
        &self,
        app: &ApplicationSpec,
        cancel: &CancellationToken,
    ) -> InstallAttemptResult {
        Engine::install(self, app, cancel).await
    }
}

/// Command line used to launch an installer of `kind`.
pub fn installer_invocation(kind: InstallerKind, installer: &Path, arguments: &[String]) -> Invocation {
    match kind {
        InstallerKind::Exe => Invocation::new(installer).args(arguments.iter().cloned()),
        InstallerKind::Msi => Invocation::new("msiexec")
            .arg("/i")
            .arg(installer.display().to_string())
            .args(arguments.iter().cloned()),
        InstallerKind::MsixBundle => system::powershell(format!(
            "Add-AppxPackage -Path {}",
            system::powershell_quote(&installer.display().to_string())
        )),
    }
}

/// File-system friendly form of an application name
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "app".to_string()
    } else {
        trimmed.to_string()
    }
}

static NEXT_SCRATCH: AtomicU64 = AtomicU64::new(0);

/// Per-attempt scratch directory, removed (best effort) on drop.
///
/// Names that slug to the same text ("Notepad++" and "Notepad") still get
/// separate directories, so parallel installs never remove each other's files.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(root: &Path, app_name: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        loop {
            let attempt = NEXT_SCRATCH.fetch_add(1, Ordering::Relaxed);
            let path = root.join(format!("{}-{}-{attempt}", slug(app_name), std::process::id()));
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(Self { path }),
                // Left behind by an earlier run that reused this pid
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            debug!(path = %self.path.display(), error = %e, "could not remove scratch directory");
        }
    }
}
