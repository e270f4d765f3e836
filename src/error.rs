use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown application: {name}{}", suggestion_suffix(.suggestion))]
    UnknownApp {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, SetupError>;

/// Why a single installation request did not fully succeed.
///
/// `Display` output is what ends up in
/// [`InstallAttemptResult::error_detail`](crate::engine::InstallAttemptResult::error_detail).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("no install method available")]
    NoInstallMethodAvailable,

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("installer failed to launch: {0}")]
    InstallerLaunchFailed(String),

    #[error("installer timed out after {}s", .0.as_secs())]
    InstallerTimedOut(Duration),

    #[error("unsupported installer type: {0}")]
    UnsupportedInstallerType(String),

    #[error("verification failed")]
    VerificationFailed,

    #[error("could not resolve download: {0}")]
    ResolutionFailed(String),

    #[error("package manager install failed: {0}")]
    PackageManagerFailed(String),

    #[error("cancelled")]
    Cancelled,
}

impl InstallError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoInstallMethodAvailable => FailureKind::NoInstallMethodAvailable,
            Self::DownloadFailed(_) => FailureKind::DownloadFailed,
            Self::InstallerLaunchFailed(_) => FailureKind::InstallerLaunchFailed,
            Self::InstallerTimedOut(_) => FailureKind::InstallerTimedOut,
            Self::UnsupportedInstallerType(_) => FailureKind::UnsupportedInstallerType,
            Self::VerificationFailed => FailureKind::VerificationFailed,
            Self::ResolutionFailed(_) => FailureKind::ResolutionFailed,
            Self::PackageManagerFailed(_) => FailureKind::PackageManagerFailed,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// Detail-free tag of an [`InstallError`], kept on results and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    NoInstallMethodAvailable,
    DownloadFailed,
    InstallerLaunchFailed,
    InstallerTimedOut,
    UnsupportedInstallerType,
    VerificationFailed,
    ResolutionFailed,
    PackageManagerFailed,
    Cancelled,
}

impl FailureKind {
    /// Retrying the whole sequence cannot change these outcomes.
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::NoInstallMethodAvailable | Self::UnsupportedInstallerType
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
