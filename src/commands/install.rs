use super::utils::{Session, print_result};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use winsetup::batch;
use winsetup::error::{Result, SetupError};
use winsetup::retry::{RetryPolicy, Retrying};
use winsetup::runlog::Level;
use winsetup::{ApplicationSpec, Engine, InstallAttemptResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub parallel: bool,
    /// Extra attempts after the first; overrides the configured retry count
    pub retries: Option<u32>,
    pub direct_only: bool,
}

pub async fn install(
    session: &Session,
    names: &[String],
    all: bool,
    options: InstallOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let apps = if all {
        session.catalog.applications.clone()
    } else {
        session.catalog.select(names)?
    };

    if apps.is_empty() {
        return Err(SetupError::Other(anyhow::anyhow!(
            "No applications specified (pass names or --all)"
        )));
    }

    let results = install_apps(session, &apps, options, cancel).await?;
    let failed = results.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 {
        return Err(SetupError::Other(anyhow::anyhow!(
            "{} of {} applications failed to install",
            failed,
            results.len()
        )));
    }
    Ok(())
}

/// Run the engine over `apps`, print each result and the run summary.
pub(super) async fn install_apps(
    session: &Session,
    apps: &[ApplicationSpec],
    options: InstallOptions,
    cancel: &CancellationToken,
) -> Result<Vec<InstallAttemptResult>> {
    let mut config = session.config.clone();
    if options.direct_only {
        config.direct_download_only = true;
    }
    if let Some(retries) = options.retries {
        config.retry.attempts = retries.saturating_add(1);
    }

    let engine = Engine::from_config(&config)?;
    let installer = Retrying::new(engine, RetryPolicy::from(&config.retry));
    let parallelism = batch::effective_parallelism(options.parallel, config.max_parallel);

    println!(
        "Installing {} applications{}...",
        apps.len().to_string().bold(),
        if parallelism > 1 {
            format!(" ({} at a time)", parallelism)
        } else {
            String::new()
        }
    );
    session.log.event(
        Level::Info,
        &format!("install run started: {} applications", apps.len()),
    );

    let results = batch::install_all(&installer, apps, parallelism, cancel, &session.log).await;

    for result in &results {
        print_result(result);
    }

    let summary = session.log.summary();
    println!(
        "{} {} installed, {} already present, {} unverified, {} failed",
        if summary.failed == 0 {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        },
        summary.installed.to_string().bold(),
        summary.already_installed,
        summary.unverified,
        summary.failed
    );
    if let Some(path) = session.log.sink() {
        println!("  Log written to {}", path.display().to_string().dimmed());
    }

    Ok(results)
}
