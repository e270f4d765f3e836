//! Dependency-aware service disabling through `sc.exe`.
//!
//! A service is only disabled when every service depending on it is in the
//! same disable list; otherwise it is skipped so nothing else breaks.

use super::{ActionOutcome, ActionReport, SystemContext};
use crate::catalog::ServiceDescriptor;
use crate::process::Invocation;
use std::collections::HashSet;
use tracing::{debug, info};

const SC: &str = "sc.exe";

/// Disable every applicable service in `services`.
pub async fn disable_services(
    ctx: &SystemContext,
    services: &[ServiceDescriptor],
) -> Vec<ActionReport> {
    let disabling: HashSet<String> = services
        .iter()
        .filter(|s| s.applies_to(ctx.release()))
        .map(|s| s.name.to_lowercase())
        .collect();

    let mut reports = Vec::with_capacity(services.len());
    for service in services {
        let report = disable_one(ctx, service, &disabling).await;
        debug!(service = %report.target, outcome = %report.outcome, "service processed");
        reports.push(report);
    }
    reports
}

async fn disable_one(
    ctx: &SystemContext,
    service: &ServiceDescriptor,
    disabling: &HashSet<String>,
) -> ActionReport {
    let name = service.name.as_str();

    if !service.applies_to(ctx.release()) {
        return ActionReport::skipped(name, "not applicable to this Windows release");
    }
    if ctx.is_cancelled() {
        return ActionReport::skipped(name, "cancelled");
    }
    if ctx.is_dry_run() {
        return ActionReport::new(name, ActionOutcome::DryRun);
    }

    match ctx.run(&Invocation::new(SC).args(["query", name])).await {
        Ok(output) if output.success() => {}
        Ok(_) => return ActionReport::skipped(name, "service not present"),
        Err(reason) => return ActionReport::failed(name, reason),
    }

    let dependents = match ctx.run(&Invocation::new(SC).args(["enumdepend", name])).await {
        Ok(output) if output.success() => parse_dependents(&output.stdout),
        Ok(output) => {
            return ActionReport::skipped(
                name,
                format!("could not list dependent services: {}", output.summary()),
            );
        }
        Err(reason) => return ActionReport::failed(name, reason),
    };

    let blocking: Vec<&str> = dependents
        .iter()
        .map(String::as_str)
        .filter(|d| !disabling.contains(&d.to_lowercase()))
        .collect();
    if !blocking.is_empty() {
        return ActionReport::skipped(name, format!("required by {}", blocking.join(", ")));
    }

    // Stopping is best effort; a service that is already stopped reports an error.
    if let Ok(output) = ctx.run(&Invocation::new(SC).args(["stop", name])).await
        && !output.success()
    {
        debug!(service = name, reason = %output.summary(), "service not stopped");
    }

    match ctx
        .run(&Invocation::new(SC).args(["config", name, "start=", "disabled"]))
        .await
    {
        Ok(output) if output.success() => {
            info!(service = name, "service disabled");
            ActionReport::new(name, ActionOutcome::Applied)
        }
        Ok(output) => ActionReport::failed(name, output.summary()),
        Err(reason) => ActionReport::failed(name, reason),
    }
}

/// Service names from `sc.exe enumdepend` output.
pub fn parse_dependents(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("SERVICE_NAME:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
