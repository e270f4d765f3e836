// Test helpers for isolated testing
// Provides fakes for every system seam so the engine can be exercised
// without launching processes, touching the network or reading the registry.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use winsetup::process::{CommandRunner, Invocation, ProcessOutcome, ProcessOutput};
use winsetup::registry::UninstallRegistry;
use winsetup::transport::{Transport, TransportError};
use winsetup::{Engine, EngineSettings};

/// Isolated test environment using temporary directories
/// Automatically cleaned up when dropped (RAII pattern)
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    /// Root for per-app scratch directories
    pub scratch: PathBuf,
    /// Stand-in for Program Files
    pub programs: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let scratch = temp_dir.path().join("scratch");
        let programs = temp_dir.path().join("Program Files");
        std::fs::create_dir_all(&programs).unwrap();

        Self {
            temp_dir,
            scratch,
            programs,
        }
    }

    /// Engine settings with short timeouts and the scratch root in this environment
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            installer_timeout: Duration::from_millis(300),
            query_timeout: Duration::from_secs(5),
            scratch_root: self.scratch.clone(),
            ..EngineSettings::default()
        }
    }

    pub fn engine(
        &self,
        runner: &Arc<FakeRunner>,
        transport: &Arc<FakeTransport>,
        registry: &Arc<FakeRegistry>,
    ) -> Engine {
        self.engine_with(self.settings(), runner, transport, registry)
    }

    pub fn engine_with(
        &self,
        settings: EngineSettings,
        runner: &Arc<FakeRunner>,
        transport: &Arc<FakeTransport>,
        registry: &Arc<FakeRegistry>,
    ) -> Engine {
        Engine::new(
            settings,
            runner.clone(),
            transport.clone(),
            registry.clone(),
        )
    }

    /// Path under the fake Program Files
    pub fn program_path(&self, relative: &str) -> PathBuf {
        self.programs.join(relative)
    }

    /// Whether anything was written under the scratch root
    pub fn scratch_is_empty(&self) -> bool {
        match std::fs::read_dir(&self.scratch) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

pub fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"").unwrap();
}

/// What a fake process does when run
#[derive(Debug, Clone)]
pub enum Reply {
    Exit { code: i32, stdout: String },
    /// Never exits on its own
    Hang,
    /// Cannot be started
    LaunchError,
}

impl Reply {
    pub fn exit(code: i32) -> Self {
        Self::Exit {
            code,
            stdout: String::new(),
        }
    }

    pub fn exit_with(code: i32, stdout: &str) -> Self {
        Self::Exit {
            code,
            stdout: stdout.to_string(),
        }
    }
}

type Responder = Box<dyn Fn(&Invocation) -> Reply + Send + Sync>;

/// Scripted [`CommandRunner`] that records every invocation
pub struct FakeRunner {
    responder: Responder,
    programs: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Invocation>>,
    refreshes: AtomicUsize,
}

impl FakeRunner {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Invocation) -> Reply + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            programs: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Every process exits 0 with no output
    pub fn succeeding() -> Self {
        Self::new(|_| Reply::exit(0))
    }

    /// Programs that `locate` can find
    pub fn with_programs(self, programs: &[&str]) -> Self {
        self.programs
            .lock()
            .unwrap()
            .extend(programs.iter().map(|p| normalize(p)));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose program name (lowercase, no `.exe`) is `name`
    pub fn calls_to(&self, name: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.program_name() == name)
            .collect()
    }

    /// winget calls using `verb` (`list` or `install`)
    pub fn winget_calls(&self, verb: &str) -> Vec<Invocation> {
        self.calls_to("winget")
            .into_iter()
            .filter(|inv| inv.args.first().map(String::as_str) == Some(verb))
            .collect()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

fn normalize(program: &str) -> String {
    let lower = program.to_lowercase();
    lower.strip_suffix(".exe").map(str::to_string).unwrap_or(lower)
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> io::Result<ProcessOutcome> {
        self.calls.lock().unwrap().push(invocation.clone());

        if cancel.is_cancelled() {
            return Ok(ProcessOutcome::Cancelled);
        }

        match (self.responder)(invocation) {
            Reply::Exit { code, stdout } => Ok(ProcessOutcome::Exited(ProcessOutput {
                exit_code: Some(code),
                stdout,
                stderr: String::new(),
            })),
            Reply::Hang => {
                tokio::select! {
                    _ = cancel.cancelled() => Ok(ProcessOutcome::Cancelled),
                    _ = tokio::time::sleep(timeout) => Ok(ProcessOutcome::TimedOut),
                }
            }
            Reply::LaunchError => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "program not found",
            )),
        }
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        let name = normalize(program);
        self.programs
            .lock()
            .unwrap()
            .contains(&name)
            .then(|| PathBuf::from(format!("C:/fake/bin/{}.exe", name)))
    }

    fn refresh_environment(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory [`Transport`] with call counting
#[derive(Default)]
pub struct FakeTransport {
    json: Mutex<HashMap<String, Value>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    json_calls: AtomicUsize,
    downloads: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(self, url: &str, value: Value) -> Self {
        self.json.lock().unwrap().insert(url.to_string(), value);
        self
    }

    pub fn with_file(self, url: &str, bytes: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn json_calls(&self) -> usize {
        self.json_calls.load(Ordering::SeqCst)
    }

    pub fn downloaded_urls(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.json_calls() + self.downloaded_urls().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        self.json_calls.fetch_add(1, Ordering::SeqCst);
        self.json
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        self.downloads.lock().unwrap().push(url.to_string());
        let bytes = self.files.lock().unwrap().get(url).cloned();
        match bytes {
            Some(bytes) => {
                tokio::fs::write(dest, &bytes).await?;
                Ok(bytes.len() as u64)
            }
            None => Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Fixed uninstall-registry contents
#[derive(Default)]
pub struct FakeRegistry {
    names: Vec<String>,
    fail: bool,
    reads: AtomicUsize,
}

impl FakeRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_names(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Every read fails with permission denied
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl UninstallRegistry for FakeRegistry {
    fn display_names(&self) -> io::Result<Vec<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "access denied",
            ));
        }
        Ok(self.names.clone())
    }
}
