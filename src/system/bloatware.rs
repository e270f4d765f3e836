//! Removal of pre-installed AppX packages.

use super::{ActionOutcome, ActionReport, SystemContext, powershell, powershell_quote};
use crate::catalog::BloatwarePackageDescriptor;
use tracing::info;

/// PowerShell that prints how many installed packages match `pattern`
pub fn build_count_script(pattern: &str) -> String {
    format!(
        "@(Get-AppxPackage -AllUsers -Name {}).Count",
        powershell_quote(pattern)
    )
}

/// PowerShell that removes installed and provisioned packages matching `pattern`
pub fn build_removal_script(pattern: &str) -> String {
    let quoted = powershell_quote(pattern);
    format!(
        "$ErrorActionPreference = 'Stop'; \
         Get-AppxPackage -AllUsers -Name {quoted} | Remove-AppxPackage -AllUsers; \
         Get-AppxProvisionedPackage -Online | Where-Object {{ $_.DisplayName -like {quoted} }} | \
         Remove-AppxProvisionedPackage -Online | Out-Null"
    )
}

pub async fn remove_bloatware(
    ctx: &SystemContext,
    packages: &[BloatwarePackageDescriptor],
) -> Vec<ActionReport> {
    let mut reports = Vec::with_capacity(packages.len());
    for package in packages {
        reports.push(remove_one(ctx, package).await);
    }
    reports
}

async fn remove_one(ctx: &SystemContext, package: &BloatwarePackageDescriptor) -> ActionReport {
    let target = package.name.as_str();

    if !package.applies_to(ctx.release()) {
        return ActionReport::skipped(target, "not applicable to this Windows release");
    }
    if ctx.is_cancelled() {
        return ActionReport::skipped(target, "cancelled");
    }
    if ctx.is_dry_run() {
        return ActionReport::new(target, ActionOutcome::DryRun);
    }

    let installed = match ctx.run(&powershell(build_count_script(&package.pattern))).await {
        Ok(output) if output.success() => match output.stdout.trim().parse::<usize>() {
            Ok(count) => count,
            Err(_) => {
                return ActionReport::failed(
                    target,
                    format!("unexpected package count output: {}", output.stdout.trim()),
                );
            }
        },
        Ok(output) => return ActionReport::failed(target, output.summary()),
        Err(reason) => return ActionReport::failed(target, reason),
    };

    if installed == 0 {
        return ActionReport::skipped(target, "not installed");
    }

    match ctx.run(&powershell(build_removal_script(&package.pattern))).await {
        Ok(output) if output.success() => {
            info!(package = target, count = installed, "removed package");
            ActionReport::new(target, ActionOutcome::Applied)
        }
        Ok(output) => ActionReport::failed(target, output.summary()),
        Err(reason) => ActionReport::failed(target, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_script() {
        assert_eq!(
            build_count_script("*CandyCrush*"),
            "@(Get-AppxPackage -AllUsers -Name '*CandyCrush*').Count"
        );
    }

    #[test]
    fn test_removal_script_quotes_pattern() {
        let script = build_removal_script("Vendor's.App");
        assert!(script.contains("-Name 'Vendor''s.App'"));
        assert!(script.contains("-like 'Vendor''s.App'"));
        assert!(script.contains("Remove-AppxProvisionedPackage -Online"));
    }
}
