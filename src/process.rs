//! Child-process execution for installers and system tools.
//!
//! Everything that launches a process goes through [`CommandRunner`], so the
//! engine and the system actions never touch `std::process` directly.
//! [`SystemRunner`] is the real implementation: every run is bounded by a
//! timeout, the child is killed when the timeout elapses or the cancellation
//! token fires, and stdout/stderr are captured for the success heuristics.
//!
//! Completion is the child's exit status, not the end of its output. Installers
//! often leave a background process holding the inherited pipes, so the pipes
//! are drained in separate tasks and given [`OUTPUT_GRACE`] after exit.

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long to keep reading a child's pipes after it has exited
pub const OUTPUT_GRACE: Duration = Duration::from_secs(2);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Lowercased file name of the program without an `.exe` suffix.
    pub fn program_name(&self) -> String {
        let name = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        name.strip_suffix(".exe").map(str::to_string).unwrap_or(name)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last non-empty line of stderr, falling back to stdout
    pub fn summary(&self) -> String {
        let pick = |s: &str| {
            s.lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        };
        pick(&self.stderr)
            .or_else(|| pick(&self.stdout))
            .unwrap_or_else(|| format!("exit code {:?}", self.exit_code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(ProcessOutput),
    /// Killed after exceeding its time budget
    TimedOut,
    /// Killed because the cancellation token fired
    Cancelled,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `invocation` to completion, or until `timeout` elapses or `cancel` fires.
    ///
    /// An `Err` means the process could not be started at all.
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::io::Result<ProcessOutcome>;

    /// Find `program` on the search path.
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Re-read PATH-like state after an installer may have changed it.
    fn refresh_environment(&self) {}
}

/// Runs real child processes with tokio
#[derive(Debug, Default)]
pub struct SystemRunner {
    path_override: RwLock<Option<OsString>>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshed PATH if one was loaded, otherwise the inherited one
    fn search_path(&self) -> Option<OsString> {
        let refreshed = self.path_override.read().ok().and_then(|p| p.clone());
        refreshed.or_else(|| std::env::var_os("PATH"))
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::io::Result<ProcessOutcome> {
        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let refreshed_path = self.path_override.read().ok().and_then(|p| p.clone());
        if let Some(path) = refreshed_path {
            command.env("PATH", path);
        }

        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        debug!(command = %invocation, timeout_secs = timeout.as_secs(), "spawning process");
        let mut child = command.spawn()?;
        let stdout = PipeReader::spawn(child.stdout.take());
        let stderr = PipeReader::spawn(child.stderr.take());

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProcessOutcome::Cancelled),
            result = tokio::time::timeout(timeout, child.wait()) => {
                result.map_err(|_| ProcessOutcome::TimedOut)
            }
        };

        match waited {
            Ok(status) => {
                let status = status?;
                let (stdout, stderr) =
                    tokio::join!(stdout.finish(OUTPUT_GRACE), stderr.finish(OUTPUT_GRACE));
                Ok(ProcessOutcome::Exited(ProcessOutput {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                }))
            }
            Err(outcome) => {
                if let Err(e) = child.kill().await {
                    debug!(command = %invocation, error = %e, "could not kill process");
                }
                match outcome {
                    ProcessOutcome::Cancelled => warn!(command = %invocation, "process cancelled"),
                    _ => warn!(
                        command = %invocation,
                        timeout_secs = timeout.as_secs(),
                        "process timed out, killed"
                    ),
                }
                Ok(outcome)
            }
        }
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        which::which_in(program, self.search_path(), cwd).ok()
    }

    fn refresh_environment(&self) {
        match crate::registry::machine_and_user_path() {
            Some(path) => {
                debug!("refreshed PATH from machine and user environment");
                if let Ok(mut guard) = self.path_override.write() {
                    *guard = Some(path);
                }
            }
            None => debug!("no persisted PATH available, keeping inherited PATH"),
        }
    }
}

/// Drains one child pipe in the background.
///
/// The task is aborted on drop, so a pipe held open by a grandchild never
/// outlives the run.
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeReader {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buffer, task }
    }

    /// Output read so far, after waiting up to `grace` for the pipe to close
    async fn finish(mut self, grace: Duration) -> String {
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            debug!("pipe still open after exit, keeping output read so far");
        }
        let bytes = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let text = String::from_utf8_lossy(&bytes).into_owned();
        text
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}
