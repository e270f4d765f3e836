//! Batch driver: installs a list of applications one after another, or with
//! a small bounded number running at once.
//!
//! A failure never stops the batch. Results come back in input order
//! regardless of completion order.

use crate::catalog::ApplicationSpec;
use crate::engine::{AppInstaller, InstallAttemptResult};
use crate::runlog::RunLog;
use futures::StreamExt;
use sysinfo::System;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const GIB: u64 = 1024 * 1024 * 1024;

/// Installer processes allowed at once for a machine of this size (2 to 4).
pub fn worker_count(physical_cpus: usize, total_memory_gib: u64) -> usize {
    if physical_cpus >= 8 && total_memory_gib >= 16 {
        4
    } else if physical_cpus >= 4 && total_memory_gib >= 8 {
        3
    } else {
        2
    }
}

/// [`worker_count`] for the current machine.
pub fn detect_worker_count() -> usize {
    let cpus = num_cpus::get_physical();
    let mut system = System::new();
    system.refresh_memory();
    let memory_gib = system.total_memory() / GIB;

    let workers = worker_count(cpus, memory_gib);
    debug!(cpus, memory_gib, workers, "detected batch worker count");
    workers
}

/// Worker count for a run: 1 when sequential, otherwise the detected count
/// capped by `max_parallel`.
pub fn effective_parallelism(parallel: bool, max_parallel: Option<usize>) -> usize {
    if !parallel {
        return 1;
    }
    let detected = detect_worker_count();
    max_parallel.map_or(detected, |cap| detected.min(cap)).max(1)
}

/// Install every app in `apps`, at most `parallelism` at a time.
///
/// Each result is recorded in `log` as soon as it completes.
pub async fn install_all<I>(
    installer: &I,
    apps: &[ApplicationSpec],
    parallelism: usize,
    cancel: &CancellationToken,
    log: &RunLog,
) -> Vec<InstallAttemptResult>
where
    I: AppInstaller + ?Sized,
{
    futures::stream::iter(apps)
        .map(|app| async move {
            let result = installer.install(app, cancel).await;
            log.record(&result);
            result
        })
        .buffered(parallelism.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_tiers() {
        assert_eq!(worker_count(8, 16), 4);
        assert_eq!(worker_count(16, 64), 4);
        assert_eq!(worker_count(8, 15), 3);
        assert_eq!(worker_count(4, 8), 3);
        assert_eq!(worker_count(4, 7), 2);
        assert_eq!(worker_count(2, 32), 2);
        assert_eq!(worker_count(1, 1), 2);
    }

    #[test]
    fn test_effective_parallelism() {
        assert_eq!(effective_parallelism(false, None), 1);
        assert_eq!(effective_parallelism(true, Some(1)), 1);

        let detected = effective_parallelism(true, None);
        assert!((2..=4).contains(&detected));
    }
}
