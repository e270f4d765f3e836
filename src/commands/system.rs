use super::utils::{Session, log_reports, print_reports};
use tokio_util::sync::CancellationToken;
use winsetup::error::Result;
use winsetup::system::{self, ActionReport};

pub async fn services(session: &Session, dry_run: bool, cancel: &CancellationToken) -> Result<()> {
    run_services(session, dry_run, cancel).await;
    Ok(())
}

pub async fn debloat(session: &Session, dry_run: bool, cancel: &CancellationToken) -> Result<()> {
    run_debloat(session, dry_run, cancel).await;
    Ok(())
}

pub async fn tweaks(session: &Session, dry_run: bool, cancel: &CancellationToken) -> Result<()> {
    run_tweaks(session, dry_run, cancel).await;
    Ok(())
}

pub(super) async fn run_services(
    session: &Session,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Vec<ActionReport> {
    let ctx = session.system_context(dry_run, cancel);
    let reports = system::disable_services(&ctx, &session.catalog.services).await;
    print_reports("Services", &reports);
    log_reports(&session.log, "disable service", &reports);
    reports
}

pub(super) async fn run_debloat(
    session: &Session,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Vec<ActionReport> {
    let ctx = session.system_context(dry_run, cancel);
    let reports = system::remove_bloatware(&ctx, &session.catalog.bloatware).await;
    print_reports("Bloatware", &reports);
    log_reports(&session.log, "remove package", &reports);
    reports
}

pub(super) async fn run_tweaks(
    session: &Session,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Vec<ActionReport> {
    let ctx = session.system_context(dry_run, cancel);
    let reports = system::apply_tweaks(&ctx, &session.catalog.registry_tweaks).await;
    print_reports("Registry tweaks", &reports);
    log_reports(&session.log, "apply tweak", &reports);
    reports
}
