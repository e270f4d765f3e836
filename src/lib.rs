//! Library interface for winsetup, a Windows provisioning tool
//!
//! This library exposes the installation engine and its collaborators for
//! the CLI and for testing.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod package_manager;
pub mod pathmatch;
pub mod process;
pub mod profile;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod runlog;
pub mod system;
pub mod transport;
pub mod verifier;

// Re-export commonly used types
pub use catalog::{ApplicationSpec, Catalog, DirectDownload, InstallerKind};
pub use engine::{AppInstaller, Engine, EngineSettings, InstallAttemptResult, InstallMethod};
pub use error::{FailureKind, InstallError, SetupError};
