//! Installation Verifier: is an application present on this system?
//!
//! Checks run in a fixed order and stop at the first positive:
//!
//! 1. package-manager query, when an id is known and the manager is callable
//! 2. uninstall-registry display names, case-insensitive substring match
//! 3. filesystem verification paths, with `%VAR%` expansion and wildcard segments
//! 4. commands on PATH, from the app's own list plus a built-in alias table
//!
//! A check that errors counts as negative for that check only.

use crate::catalog::ApplicationSpec;
use crate::package_manager::PackageManager;
use crate::pathmatch;
use crate::process::CommandRunner;
use crate::registry::UninstallRegistry;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Commands that well-known applications put on PATH, keyed by lowercase name
const COMMAND_ALIASES: &[(&str, &[&str])] = &[
    ("git", &["git"]),
    ("visual studio code", &["code"]),
    ("vscode", &["code"]),
    ("python", &["python", "py"]),
    ("python 3", &["python", "py"]),
    ("node.js", &["node"]),
    ("node.js lts", &["node"]),
    ("nodejs", &["node"]),
    ("7-zip", &["7z"]),
    ("powershell", &["pwsh"]),
    ("powershell 7", &["pwsh"]),
    ("windows terminal", &["wt"]),
    ("mozilla firefox", &["firefox"]),
    ("firefox", &["firefox"]),
    ("vlc", &["vlc"]),
    ("vlc media player", &["vlc"]),
    ("google chrome", &["chrome"]),
    ("chrome", &["chrome"]),
    ("notepad++", &["notepad++"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationCheck {
    PackageManager,
    Registry,
    Filesystem,
    Command,
}

/// What to look for when verifying one application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationHints {
    pub package_manager_id: Option<String>,
    /// Display-name fragment for the uninstall registry; the app name when unset
    pub registry_name: Option<String>,
    pub paths: Vec<String>,
    pub commands: Vec<String>,
}

impl VerificationHints {
    pub fn for_app(app: &ApplicationSpec) -> Self {
        Self {
            package_manager_id: app.package_manager_id.clone(),
            registry_name: app.registry_name.clone(),
            paths: app.verification_paths().to_vec(),
            commands: app.commands.clone(),
        }
    }
}

/// Result of a verification pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub matched_by: Option<VerificationCheck>,
    /// What matched: a registry entry, a path, or a resolved command
    pub evidence: Option<String>,
}

impl Verification {
    pub fn installed(&self) -> bool {
        self.matched_by.is_some()
    }

    fn found(check: VerificationCheck, evidence: impl Into<String>) -> Self {
        Self {
            matched_by: Some(check),
            evidence: Some(evidence.into()),
        }
    }
}

#[derive(Clone)]
pub struct Verifier {
    package_manager: Option<PackageManager>,
    registry: Arc<dyn UninstallRegistry>,
    runner: Arc<dyn CommandRunner>,
}

impl Verifier {
    pub fn new(
        package_manager: Option<PackageManager>,
        registry: Arc<dyn UninstallRegistry>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            package_manager,
            registry,
            runner,
        }
    }

    pub async fn is_installed(
        &self,
        app_name: &str,
        hints: &VerificationHints,
        cancel: &CancellationToken,
    ) -> bool {
        self.verify(app_name, hints, cancel).await.installed()
    }

    pub async fn verify(
        &self,
        app_name: &str,
        hints: &VerificationHints,
        cancel: &CancellationToken,
    ) -> Verification {
        if let Some(id) = &hints.package_manager_id
            && let Some(manager) = &self.package_manager
            && manager.is_available()
            && manager.is_installed(id, cancel).await
        {
            debug!(app = %app_name, id, "verified by package manager");
            return Verification::found(VerificationCheck::PackageManager, id.clone());
        }

        let needle = hints.registry_name.as_deref().unwrap_or(app_name);
        if let Some(entry) = self.registry_match(needle) {
            debug!(app = %app_name, entry = %entry, "verified by uninstall registry");
            return Verification::found(VerificationCheck::Registry, entry);
        }

        for pattern in &hints.paths {
            if let Some(path) = pathmatch::candidates(pattern).into_iter().next() {
                debug!(app = %app_name, path = %path.display(), "verified by filesystem");
                return Verification::found(
                    VerificationCheck::Filesystem,
                    path.display().to_string(),
                );
            }
        }

        for command in commands_for(app_name, &hints.commands) {
            if let Some(path) = self.runner.locate(&command) {
                debug!(app = %app_name, command, path = %path.display(), "verified by command on PATH");
                return Verification::found(VerificationCheck::Command, path.display().to_string());
            }
        }

        debug!(app = %app_name, "no verification check matched");
        Verification::default()
    }

    fn registry_match(&self, needle: &str) -> Option<String> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        match self.registry.display_names() {
            Ok(names) => names
                .into_iter()
                .find(|name| name.to_lowercase().contains(&needle)),
            Err(e) => {
                debug!(error = %e, "uninstall registry not readable");
                None
            }
        }
    }
}

/// Built-in commands for a known application name
pub fn command_aliases(app_name: &str) -> &'static [&'static str] {
    let name = app_name.trim().to_lowercase();
    COMMAND_ALIASES
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, commands)| *commands)
        .unwrap_or(&[])
}

/// Configured commands first, then aliases, without duplicates.
fn commands_for(app_name: &str, configured: &[String]) -> Vec<String> {
    let mut commands: Vec<String> = Vec::new();
    let aliases = command_aliases(app_name).iter().map(|c| c.to_string());
    for command in configured.iter().cloned().chain(aliases) {
        if !commands.iter().any(|c| c.eq_ignore_ascii_case(&command)) {
            commands.push(command);
        }
    }
    commands
}
