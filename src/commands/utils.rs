//! Shared state and output helpers for command implementations

use crate::colors;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use winsetup::catalog::Catalog;
use winsetup::config::Config;
use winsetup::error::Result;
use winsetup::process::SystemRunner;
use winsetup::registry;
use winsetup::runlog::RunLog;
use winsetup::system::{ActionOutcome, ActionReport, SystemContext};
use winsetup::InstallAttemptResult;

/// Configuration, catalog and run log for one CLI invocation
pub struct Session {
    pub config: Config,
    pub catalog: Catalog,
    pub log: RunLog,
}

impl Session {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path)?;
        let catalog = Catalog::load(config.catalog.as_deref())?;
        let log = match &config.log_file {
            Some(path) => RunLog::with_file(path),
            None => RunLog::new(),
        };
        Ok(Self {
            config,
            catalog,
            log,
        })
    }

    /// Context for services, debloat and tweaks against the real system
    pub(super) fn system_context(&self, dry_run: bool, cancel: &CancellationToken) -> SystemContext {
        let release = registry::detect_os_release();
        tracing::debug!(?release, "detected Windows release");
        SystemContext::new(Arc::new(SystemRunner::new()), release)
            .with_dry_run(dry_run)
            .with_timeout(self.config.query_timeout().max(Duration::from_secs(30)))
            .with_cancel(cancel.clone())
    }
}

pub(super) fn print_result(result: &InstallAttemptResult) {
    let name = result.app_name().bold();
    let mark = colors::result_mark(result);
    match (result.succeeded(), result.error_detail()) {
        (true, None) => println!("  {} {} ({})", mark, name, result.method_used().to_string().dimmed()),
        (true, Some(detail)) => println!(
            "  {} {} ({}, {})",
            mark,
            name,
            result.method_used().to_string().dimmed(),
            detail.yellow()
        ),
        (false, detail) => println!(
            "  {} {}: {}",
            mark,
            name,
            detail.unwrap_or("unknown error")
        ),
    }
}

pub(super) fn print_reports(title: &str, reports: &[ActionReport]) {
    println!("{}", format!("==> {}", title).bold().green());
    for report in reports {
        let reason = match &report.outcome {
            ActionOutcome::Skipped(reason) | ActionOutcome::Failed(reason) => {
                format!(" ({})", reason).dimmed().to_string()
            }
            ActionOutcome::DryRun => " (dry run)".dimmed().to_string(),
            ActionOutcome::Applied => String::new(),
        };
        println!("  {} {}{}", colors::report_mark(report), report.target, reason);
    }

    let applied = reports
        .iter()
        .filter(|r| r.outcome == ActionOutcome::Applied)
        .count();
    let failed = reports.iter().filter(|r| r.is_failure()).count();
    println!(
        "  {} applied, {} failed, {} total",
        applied.to_string().bold(),
        failed.to_string().bold(),
        reports.len()
    );
}

/// Mirror sibling-operation reports into the run log.
pub(super) fn log_reports(log: &RunLog, operation: &str, reports: &[ActionReport]) {
    use winsetup::runlog::Level;
    for report in reports {
        let level = match report.outcome {
            ActionOutcome::Failed(_) => Level::Error,
            _ => Level::Info,
        };
        log.event(level, &format!("{}: {}: {}", operation, report.target, report.outcome));
    }
}
