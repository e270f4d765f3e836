use super::install::{InstallOptions, install_apps};
use super::system::{run_debloat, run_services, run_tweaks};
use super::utils::Session;
use colored::Colorize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use winsetup::error::{Result, SetupError};
use winsetup::profile::Profile;

/// Write a profile selecting the whole catalog.
pub fn init(session: &Session, path: &Path) -> Result<()> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "default".to_string());

    let profile = Profile::from_catalog(name, &session.catalog);
    profile.save(path)?;

    println!(
        "{} Wrote profile {} ({} applications)",
        "✓".green(),
        path.display().to_string().bold(),
        profile.apps.len()
    );
    Ok(())
}

/// Replay a profile: install its applications, then the selected system steps.
pub async fn run(session: &Session, path: &Path, cancel: &CancellationToken) -> Result<()> {
    let profile = Profile::load(path)?;
    println!("Running profile {}", profile.name.cyan().bold());

    let apps = session.catalog.select(&profile.apps)?;
    let options = InstallOptions {
        parallel: profile.parallel,
        ..InstallOptions::default()
    };

    let failed_installs = if apps.is_empty() {
        0
    } else {
        install_apps(session, &apps, options, cancel)
            .await?
            .iter()
            .filter(|r| !r.succeeded())
            .count()
    };

    if profile.disable_services && !cancel.is_cancelled() {
        run_services(session, false, cancel).await;
    }
    if profile.remove_bloatware && !cancel.is_cancelled() {
        run_debloat(session, false, cancel).await;
    }
    if profile.apply_tweaks && !cancel.is_cancelled() {
        run_tweaks(session, false, cancel).await;
    }

    if failed_installs > 0 {
        return Err(SetupError::Other(anyhow::anyhow!(
            "{} applications failed to install",
            failed_installs
        )));
    }
    Ok(())
}
