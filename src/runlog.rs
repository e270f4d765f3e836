//! Append-only run log.
//!
//! Every install result is kept in memory for the end-of-run summary and,
//! when a file is configured, written as one timestamped line. Failing to
//! write the file is reported on stderr and never interrupts the run.

use crate::engine::{InstallAttemptResult, InstallMethod};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO ",
            Self::Warn => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub installed: usize,
    pub already_installed: usize,
    /// Succeeded without verification
    pub unverified: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct RunLog {
    results: Mutex<Vec<InstallAttemptResult>>,
    sink: Option<PathBuf>,
}

impl RunLog {
    /// In-memory only
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append lines to `path`
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            results: Mutex::new(Vec::new()),
            sink: Some(path.into()),
        }
    }

    pub fn sink(&self) -> Option<&Path> {
        self.sink.as_deref()
    }

    pub fn record(&self, result: &InstallAttemptResult) {
        let level = if !result.succeeded() {
            Level::Error
        } else if result.is_soft_success() {
            Level::Warn
        } else {
            Level::Info
        };
        self.write_line(&format_line(result.timestamp(), level, &describe(result)));

        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(result.clone());
    }

    /// Free-form event line (sibling operations, run boundaries)
    pub fn event(&self, level: Level, message: &str) {
        self.write_line(&format_line(Utc::now(), level, message));
    }

    /// Snapshot of recorded results, in recording order
    pub fn results(&self) -> Vec<InstallAttemptResult> {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn summary(&self) -> RunSummary {
        let results = self.results();
        let mut summary = RunSummary {
            total: results.len(),
            ..RunSummary::default()
        };
        for result in &results {
            if !result.succeeded() {
                summary.failed += 1;
            } else if result.method_used() == InstallMethod::AlreadyInstalled {
                summary.already_installed += 1;
            } else if result.is_soft_success() {
                summary.unverified += 1;
            } else {
                summary.installed += 1;
            }
        }
        summary
    }

    fn write_line(&self, line: &str) {
        let Some(path) = &self.sink else {
            return;
        };

        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));

        if let Err(e) = written {
            eprintln!("{}", line);
            tracing::warn!(path = %path.display(), error = %e, "could not write run log");
        }
    }
}

pub fn format_line(timestamp: DateTime<Utc>, level: Level, message: &str) -> String {
    format!(
        "{} {} {}",
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        level.label(),
        message
    )
}

fn describe(result: &InstallAttemptResult) -> String {
    let app = result.app_name();
    match (result.succeeded(), result.method_used()) {
        (true, InstallMethod::AlreadyInstalled) => format!("{app}: already installed"),
        (true, method) => match result.error_detail() {
            Some(detail) => format!("{app}: installed via {method} ({detail})"),
            None => format!("{app}: installed via {method}"),
        },
        (false, method) => format!(
            "{app}: failed (last method: {method}): {}",
            result.error_detail().unwrap_or("unknown error")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstallError;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_format_line() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            format_line(ts, Level::Warn, "Git: installed"),
            "2024-03-01T12:30:05Z WARN  Git: installed"
        );
    }

    #[test]
    fn test_record_appends_to_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.log");
        let log = RunLog::with_file(&path);

        log.record(&InstallAttemptResult::already_installed("Git"));
        log.record(&InstallAttemptResult::soft_success(
            "VLC media player",
            InstallMethod::DirectDownload,
        ));
        log.record(&InstallAttemptResult::failed(
            "Steam",
            InstallMethod::DirectDownload,
            &InstallError::DownloadFailed("connection reset".to_string()),
        ));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("INFO  Git: already installed"));
        assert!(lines[1].contains("WARN "));
        assert!(lines[1].ends_with("installed via direct download (verification failed)"));
        assert!(lines[2].contains("ERROR"));
        assert!(lines[2].ends_with("download failed: connection reset"));
    }

    #[test]
    fn test_unwritable_sink_does_not_abort() {
        let tmp = TempDir::new().unwrap();
        // A directory cannot be opened for appending
        let log = RunLog::with_file(tmp.path());
        log.record(&InstallAttemptResult::already_installed("Git"));
        log.event(Level::Info, "run finished");
        assert_eq!(log.results().len(), 1);
    }

    #[test]
    fn test_summary_counts() {
        let log = RunLog::new();
        log.record(&InstallAttemptResult::already_installed("A"));
        log.record(&InstallAttemptResult::success("B", InstallMethod::PackageManager));
        log.record(&InstallAttemptResult::soft_success("C", InstallMethod::DirectDownload));
        log.record(&InstallAttemptResult::failed(
            "D",
            InstallMethod::None,
            &InstallError::NoInstallMethodAvailable,
        ));

        assert_eq!(
            log.summary(),
            RunSummary {
                total: 4,
                installed: 1,
                already_installed: 1,
                unverified: 1,
                failed: 1,
            }
        );
    }
}
