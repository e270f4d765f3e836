//! Registry tweaks applied through `reg.exe add`.

use super::{ActionOutcome, ActionReport, SystemContext};
use crate::catalog::{RegistryData, RegistryTweakDescriptor};
use crate::process::Invocation;
use tracing::info;

/// `reg.exe add` invocation that writes one tweak, overwriting any existing value.
pub fn tweak_invocation(tweak: &RegistryTweakDescriptor) -> Invocation {
    let (kind, data) = match &tweak.data {
        RegistryData::Dword(value) => ("REG_DWORD", value.to_string()),
        RegistryData::String(value) => ("REG_SZ", value.clone()),
    };

    Invocation::new("reg.exe").args([
        "add",
        tweak.path.as_str(),
        "/v",
        tweak.value.as_str(),
        "/t",
        kind,
        "/d",
        data.as_str(),
        "/f",
    ])
}

pub async fn apply_tweaks(
    ctx: &SystemContext,
    tweaks: &[RegistryTweakDescriptor],
) -> Vec<ActionReport> {
    let mut reports = Vec::with_capacity(tweaks.len());

    for tweak in tweaks {
        let target = tweak.name.as_str();
        let report = if !tweak.applies_to(ctx.release()) {
            ActionReport::skipped(target, "not applicable to this Windows release")
        } else if ctx.is_cancelled() {
            ActionReport::skipped(target, "cancelled")
        } else if ctx.is_dry_run() {
            ActionReport::new(target, ActionOutcome::DryRun)
        } else {
            match ctx.run(&tweak_invocation(tweak)).await {
                Ok(output) if output.success() => {
                    info!(tweak = target, path = %tweak.path, value = %tweak.value, "tweak applied");
                    ActionReport::new(target, ActionOutcome::Applied)
                }
                Ok(output) => ActionReport::failed(target, output.summary()),
                Err(reason) => ActionReport::failed(target, reason),
            }
        };
        reports.push(report);
    }

    reports
}
