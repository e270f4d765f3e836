//! Sibling provisioning operations over the static catalog.
//!
//! Each operation is a single pass over a descriptor list and produces one
//! [`ActionReport`] per entry. Nothing here aborts the pass: a failing entry
//! is reported and the next one is processed.

pub mod bloatware;
pub mod services;
pub mod tweaks;

pub use bloatware::remove_bloatware;
pub use services::disable_services;
pub use tweaks::apply_tweaks;

use crate::catalog::OsRelease;
use crate::process::{CommandRunner, Invocation, ProcessOutcome, ProcessOutput};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied,
    Skipped(String),
    Failed(String),
    /// Would have been applied; nothing was run
    DryRun,
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::DryRun => write!(f, "dry run"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub target: String,
    pub outcome: ActionOutcome,
}

impl ActionReport {
    pub fn new(target: impl Into<String>, outcome: ActionOutcome) -> Self {
        Self {
            target: target.into(),
            outcome,
        }
    }

    pub fn skipped(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(target, ActionOutcome::Skipped(reason.into()))
    }

    pub fn failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(target, ActionOutcome::Failed(reason.into()))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Failed(_))
    }
}

/// Shared environment for the sibling operations
#[derive(Clone)]
pub struct SystemContext {
    runner: Arc<dyn CommandRunner>,
    release: Option<OsRelease>,
    dry_run: bool,
    timeout: Duration,
    cancel: CancellationToken,
}

impl SystemContext {
    pub fn new(runner: Arc<dyn CommandRunner>, release: Option<OsRelease>) -> Self {
        Self {
            runner,
            release,
            dry_run: false,
            timeout: DEFAULT_ACTION_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn release(&self) -> Option<OsRelease> {
        self.release
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run a system tool, flattening timeouts and launch errors into a reason string.
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, String> {
        match self.runner.run(invocation, self.timeout, &self.cancel).await {
            Ok(ProcessOutcome::Exited(output)) => Ok(output),
            Ok(ProcessOutcome::TimedOut) => {
                Err(format!("{} timed out", invocation.program_name()))
            }
            Ok(ProcessOutcome::Cancelled) => Err("cancelled".to_string()),
            Err(e) => Err(format!("could not run {}: {}", invocation.program_name(), e)),
        }
    }
}

/// Quote a value for a single-quoted PowerShell string.
pub(crate) fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(crate) fn powershell(script: String) -> Invocation {
    Invocation::new("powershell").args([
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        script,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powershell_quote() {
        assert_eq!(powershell_quote("Microsoft.BingNews"), "'Microsoft.BingNews'");
        assert_eq!(powershell_quote("it's"), "'it''s'");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ActionOutcome::Applied.to_string(), "applied");
        assert_eq!(
            ActionOutcome::Skipped("not present".to_string()).to_string(),
            "skipped: not present"
        );
        assert_eq!(ActionOutcome::DryRun.to_string(), "dry run");
        assert!(ActionReport::failed("x", "boom").is_failure());
    }
}
