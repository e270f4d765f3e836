//! Wrapper around the OS package manager CLI (winget).
//!
//! Two verbs are used: `list` to ask whether a package is present, and
//! `install` in silent mode with source and package agreements accepted.
//! Success of an install is read from two independent signals, captured in
//! [`MethodOutcome`]: a zero exit code, or a known success phrase in the
//! output. winget occasionally reports a non-zero exit code for installs that
//! went through, so either signal is enough.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use winsetup::package_manager::PackageManager;
//! use winsetup::process::SystemRunner;
//!
//! # async fn demo() {
//! let winget = PackageManager::new(Arc::new(SystemRunner::new()), "winget");
//! let cancel = CancellationToken::new();
//! if winget.is_available() && !winget.is_installed("Git.Git", &cancel).await {
//!     match winget.install("Git.Git", &cancel).await {
//!         Ok(outcome) => println!("installed (exit code {:?})", outcome.exit_code),
//!         Err(e) => eprintln!("winget failed: {e}"),
//!     }
//! }
//! # }
//! ```

use crate::error::InstallError;
use crate::process::{CommandRunner, Invocation, ProcessOutcome, ProcessOutput};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Output fragments that mean the package ended up installed
pub const SUCCESS_PHRASES: &[&str] = &[
    "Successfully installed",
    "Found an existing package already installed",
];

/// `list` output when the id is not installed
pub const NOT_INSTALLED_PHRASE: &str = "No installed package found";

const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of one install invocation, as reported by the tool itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodOutcome {
    pub exit_code: Option<i32>,
    pub matched_success_text: bool,
}

impl MethodOutcome {
    pub fn from_output(output: &ProcessOutput) -> Self {
        let matched_success_text = SUCCESS_PHRASES
            .iter()
            .any(|phrase| output.stdout.contains(phrase) || output.stderr.contains(phrase));
        Self {
            exit_code: output.exit_code,
            matched_success_text,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) || self.matched_success_text
    }
}

#[derive(Clone)]
pub struct PackageManager {
    runner: Arc<dyn CommandRunner>,
    program: String,
    install_timeout: Duration,
    query_timeout: Duration,
    allow_hash_override: bool,
}

impl PackageManager {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            allow_hash_override: true,
        }
    }

    pub fn with_timeouts(mut self, install: Duration, query: Duration) -> Self {
        self.install_timeout = install;
        self.query_timeout = query;
        self
    }

    /// Whether a second install attempt may skip installer hash validation.
    pub fn with_hash_override(mut self, allow: bool) -> Self {
        self.allow_hash_override = allow;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn is_available(&self) -> bool {
        self.runner.locate(&self.program).is_some()
    }

    /// Query the package database for `id`.
    ///
    /// Any failure to run the query counts as "not installed".
    pub async fn is_installed(&self, id: &str, cancel: &CancellationToken) -> bool {
        let Some(program) = self.runner.locate(&self.program) else {
            return false;
        };

        let invocation = Invocation::new(program).args([
            "list",
            "--id",
            id,
            "--exact",
            "--accept-source-agreements",
            "--disable-interactivity",
        ]);

        match self.runner.run(&invocation, self.query_timeout, cancel).await {
            Ok(ProcessOutcome::Exited(output)) => list_reports_installed(&output, id),
            Ok(other) => {
                debug!(id, outcome = ?other, "package query did not complete");
                false
            }
            Err(e) => {
                debug!(id, error = %e, "package query could not be launched");
                false
            }
        }
    }

    /// Install arguments in escalation order.
    pub fn install_invocations(&self, id: &str) -> Vec<Vec<String>> {
        let standard: Vec<String> = [
            "install",
            "--id",
            id,
            "--exact",
            "--silent",
            "--accept-source-agreements",
            "--accept-package-agreements",
            "--disable-interactivity",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut attempts = vec![standard.clone()];
        if self.allow_hash_override {
            let mut permissive = standard;
            permissive.push("--ignore-security-hash".to_string());
            attempts.push(permissive);
        }
        attempts
    }

    /// Run the install escalation once.
    ///
    /// Stops at the first invocation that reports success. A timeout,
    /// cancellation or launch error ends the pass immediately.
    pub async fn install(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<MethodOutcome, InstallError> {
        self.run_installs(id, self.install_invocations(id), cancel).await
    }

    /// Only the standard install invocation, without hash-override escalation.
    pub async fn install_standard(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<MethodOutcome, InstallError> {
        let mut invocations = self.install_invocations(id);
        invocations.truncate(1);
        self.run_installs(id, invocations, cancel).await
    }

    async fn run_installs(
        &self,
        id: &str,
        invocations: Vec<Vec<String>>,
        cancel: &CancellationToken,
    ) -> Result<MethodOutcome, InstallError> {
        let program = self.runner.locate(&self.program).ok_or_else(|| {
            InstallError::PackageManagerFailed(format!("{} not found", self.program))
        })?;

        let mut last_error = String::from("no install attempt made");

        for args in invocations {
            if cancel.is_cancelled() {
                return Err(InstallError::Cancelled);
            }

            let invocation = Invocation::new(&program).args(args);
            info!(id, command = %invocation, "installing with package manager");

            match self.runner.run(&invocation, self.install_timeout, cancel).await {
                Ok(ProcessOutcome::Exited(output)) => {
                    let outcome = MethodOutcome::from_output(&output);
                    if outcome.succeeded() {
                        debug!(
                            id,
                            exit_code = ?outcome.exit_code,
                            matched_success_text = outcome.matched_success_text,
                            "package manager reported success"
                        );
                        return Ok(outcome);
                    }
                    last_error = format!(
                        "exit code {}: {}",
                        output.exit_code.map_or("none".to_string(), |c| c.to_string()),
                        output.summary()
                    );
                    warn!(id, error = %last_error, "package manager install attempt failed");
                }
                Ok(ProcessOutcome::TimedOut) => {
                    return Err(InstallError::InstallerTimedOut(self.install_timeout));
                }
                Ok(ProcessOutcome::Cancelled) => return Err(InstallError::Cancelled),
                Err(e) => {
                    return Err(InstallError::PackageManagerFailed(format!(
                        "could not launch {}: {}",
                        self.program, e
                    )));
                }
            }
        }

        Err(InstallError::PackageManagerFailed(last_error))
    }
}

fn list_reports_installed(output: &ProcessOutput, id: &str) -> bool {
    if !output.success() {
        return false;
    }
    let text = format!("{}\n{}", output.stdout, output.stderr).to_lowercase();
    !text.contains(&NOT_INSTALLED_PHRASE.to_lowercase()) && text.contains(&id.to_lowercase())
}
