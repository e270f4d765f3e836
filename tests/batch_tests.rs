// Batch driver and retry decorator tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use winsetup::batch::install_all;
use winsetup::error::InstallError;
use winsetup::retry::{RetryPolicy, Retrying};
use winsetup::runlog::RunLog;
use winsetup::{AppInstaller, ApplicationSpec, FailureKind, InstallAttemptResult, InstallMethod};

/// Installer that sleeps per app and tracks how many installs overlap
#[derive(Default)]
struct SlowInstaller {
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    running: AtomicUsize,
    peak: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl SlowInstaller {
    fn with_delay(mut self, app: &str, millis: u64) -> Self {
        self.delays.insert(app.to_string(), Duration::from_millis(millis));
        self
    }

    fn failing(mut self, app: &str) -> Self {
        self.failing.push(app.to_string());
        self
    }
}

#[async_trait]
impl AppInstaller for SlowInstaller {
    async fn install(&self, app: &ApplicationSpec, _cancel: &CancellationToken) -> InstallAttemptResult {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(&app.name)
            .copied()
            .unwrap_or(Duration::from_millis(20));
        tokio::time::sleep(delay).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(app.name.clone());

        if self.failing.contains(&app.name) {
            InstallAttemptResult::failed(
                &app.name,
                InstallMethod::DirectDownload,
                &InstallError::DownloadFailed("connection reset".to_string()),
            )
        } else {
            InstallAttemptResult::success(&app.name, InstallMethod::PackageManager)
        }
    }
}

/// Installer that replays a scripted sequence of results
struct ScriptedInstaller {
    script: Mutex<Vec<InstallError>>,
    calls: AtomicUsize,
}

impl ScriptedInstaller {
    /// Fails with each error in turn, then succeeds
    fn new(errors: Vec<InstallError>) -> Self {
        Self {
            script: Mutex::new(errors.into_iter().rev().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppInstaller for ScriptedInstaller {
    async fn install(&self, app: &ApplicationSpec, _cancel: &CancellationToken) -> InstallAttemptResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop() {
            Some(error) => InstallAttemptResult::failed(&app.name, InstallMethod::DirectDownload, &error),
            None => InstallAttemptResult::success(&app.name, InstallMethod::DirectDownload),
        }
    }
}

fn apps(names: &[&str]) -> Vec<ApplicationSpec> {
    names.iter().map(|n| ApplicationSpec::new(*n)).collect()
}

fn quick_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    }
}

#[tokio::test]
async fn test_results_keep_input_order() {
    let installer = SlowInstaller::default()
        .with_delay("Slow", 150)
        .with_delay("Fast", 5);
    let log = RunLog::new();

    let results = install_all(
        &installer,
        &apps(&["Slow", "Fast", "Medium"]),
        3,
        &CancellationToken::new(),
        &log,
    )
    .await;

    let names: Vec<&str> = results.iter().map(|r| r.app_name()).collect();
    assert_eq!(names, vec!["Slow", "Fast", "Medium"]);

    // Completion order differs from input order
    assert_eq!(installer.completed.lock().unwrap()[0], "Fast");
    assert_eq!(log.results().len(), 3);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let installer = SlowInstaller::default();
    let names: Vec<String> = (0..10).map(|i| format!("App {i}")).collect();
    let list: Vec<ApplicationSpec> = names.iter().map(ApplicationSpec::new).collect();

    install_all(&installer, &list, 3, &CancellationToken::new(), &RunLog::new()).await;

    let peak = installer.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak}");
    assert!(peak >= 2, "installs never overlapped");
}

#[tokio::test]
async fn test_sequential_batch() {
    let installer = SlowInstaller::default();
    install_all(&installer, &apps(&["A", "B", "C"]), 1, &CancellationToken::new(), &RunLog::new()).await;
    assert_eq!(installer.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_does_not_stop_batch() {
    let installer = SlowInstaller::default().failing("Broken");
    let log = RunLog::new();

    let results = install_all(
        &installer,
        &apps(&["First", "Broken", "Last"]),
        1,
        &CancellationToken::new(),
        &log,
    )
    .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].succeeded());
    assert_eq!(results[1].failure(), Some(FailureKind::DownloadFailed));
    assert!(results[2].succeeded());

    let summary = log.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.installed, 2);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn test_retry_until_success() {
    let retrying = Retrying::new(
        ScriptedInstaller::new(vec![
            InstallError::DownloadFailed("timeout".to_string()),
            InstallError::InstallerTimedOut(Duration::from_secs(300)),
        ]),
        quick_policy(3),
    );

    let result = retrying
        .install(&ApplicationSpec::new("Flaky"), &CancellationToken::new())
        .await;

    assert!(result.succeeded());
    assert_eq!(retrying.inner().calls(), 3);
}

#[tokio::test]
async fn test_retry_attempts_exhausted() {
    let retrying = Retrying::new(
        ScriptedInstaller::new(vec![
            InstallError::DownloadFailed("a".to_string()),
            InstallError::DownloadFailed("b".to_string()),
            InstallError::DownloadFailed("c".to_string()),
        ]),
        quick_policy(2),
    );

    let result = retrying
        .install(&ApplicationSpec::new("Flaky"), &CancellationToken::new())
        .await;

    assert!(!result.succeeded());
    assert_eq!(result.error_detail(), Some("download failed: b"));
    assert_eq!(retrying.inner().calls(), 2);
}

#[tokio::test]
async fn test_permanent_failure_not_retried() {
    let retrying = Retrying::new(
        ScriptedInstaller::new(vec![InstallError::UnsupportedInstallerType(".zip".to_string())]),
        quick_policy(5),
    );

    let result = retrying
        .install(&ApplicationSpec::new("Archive"), &CancellationToken::new())
        .await;

    assert_eq!(result.failure(), Some(FailureKind::UnsupportedInstallerType));
    assert_eq!(retrying.inner().calls(), 1);
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let retrying = Retrying::new(
        ScriptedInstaller::new(vec![InstallError::DownloadFailed("reset".to_string())]),
        RetryPolicy {
            attempts: 3,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        },
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        retrying.install(&ApplicationSpec::new("Flaky"), &cancel),
    )
    .await
    .expect("backoff should stop on cancel");

    assert_eq!(result.failure(), Some(FailureKind::Cancelled));
    assert_eq!(result.method_used(), InstallMethod::DirectDownload);
    assert_eq!(retrying.inner().calls(), 1);
}

#[tokio::test]
async fn test_retrying_engine_in_batch() {
    let retrying = Arc::new(Retrying::new(
        ScriptedInstaller::new(vec![InstallError::DownloadFailed("reset".to_string())]),
        quick_policy(2),
    ));

    let results = install_all(
        retrying.as_ref(),
        &apps(&["One", "Two"]),
        1,
        &CancellationToken::new(),
        &RunLog::new(),
    )
    .await;

    assert!(results.iter().all(|r| r.succeeded()));
    assert_eq!(retrying.inner().calls(), 3);
}
