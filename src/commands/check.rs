use super::utils::Session;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use winsetup::Engine;
use winsetup::error::Result;
use winsetup::verifier::VerificationHints;

/// Report which applications are already present, without installing anything.
pub async fn check(session: &Session, names: &[String], cancel: &CancellationToken) -> Result<()> {
    let apps = if names.is_empty() {
        session.catalog.applications.clone()
    } else {
        session.catalog.select(names)?
    };

    let engine = Engine::from_config(&session.config)?;
    let mut present = 0;

    for app in &apps {
        if cancel.is_cancelled() {
            break;
        }

        let verification = engine
            .verifier()
            .verify(&app.name, &VerificationHints::for_app(app), cancel)
            .await;

        match (&verification.matched_by, &verification.evidence) {
            (Some(check), evidence) => {
                present += 1;
                println!(
                    "  {} {} {}",
                    "✓".green(),
                    app.name.bold(),
                    format!(
                        "({:?}{})",
                        check,
                        evidence
                            .as_deref()
                            .map(|e| format!(": {}", e))
                            .unwrap_or_default()
                    )
                    .dimmed()
                );
            }
            (None, _) => println!("  {} {} not installed", "✗".red(), app.name.bold()),
        }
    }

    println!(
        "{} of {} applications installed",
        present.to_string().bold(),
        apps.len()
    );
    Ok(())
}
