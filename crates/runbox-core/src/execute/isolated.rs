//! Isolated-process runner.
//!
//! Runs a guest library inside a separate `runbox-host` process:
//!
//! ```text
//! Preparing-Sandbox ──► Compiling (on disk) ──► Copying-Dependencies ──► Launching-Host
//!     ──► Streaming ──► Exited | Cancelled | Faulted ──► Cleanup
//! ```
//!
//! The engine creates the sandbox with [`IsolatedRunner::prepare_sandbox`]
//! and compiles into it; [`IsolatedRunner::run`] takes it from there and
//! always removes it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::classify::ExecutionModeDecision;
use crate::compile::{Reference, dylib_extension};
use crate::error::{Error, Result};
use crate::output::{OutputSink, Utf8ChunkDecoder};
use crate::paths::SandboxDir;
use crate::session::{ChildProcessHandle, SessionRegistry, SessionTicket};

use super::AbortHandle;
use super::RunStatus;

/// Name of the execution host binary.
pub const HOST_BINARY_NAME: &str = if cfg!(windows) {
    "runbox-host.exe"
} else {
    "runbox-host"
};

/// Default bound on concurrently running child processes.
pub const DEFAULT_MAX_CONCURRENT_PROCESSES: usize = 8;

const CHUNK_SIZE: usize = 1024;

/// How long to wait for output pumps after the host has exited.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Find the runbox-host binary.
///
/// Looks in the following order:
/// 1. `configured` (from `EngineConfig::host_path`)
/// 2. `RUNBOX_HOST_PATH` environment variable
/// 3. Same directory as the current executable (and its parent, for test binaries in `deps/`)
/// 4. System PATH
/// 5. For development: `target/debug` or `target/release` of this workspace
pub fn find_host_binary(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!("Configured host path {} does not exist", path.display());
    }

    if let Ok(path) = std::env::var("RUNBOX_HOST_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Ok(exe_path) = std::env::current_exe() {
        let mut dir = exe_path.parent();
        for _ in 0..2 {
            let Some(exe_dir) = dir else { break };
            let host_path = exe_dir.join(HOST_BINARY_NAME);
            if host_path.exists() {
                return Ok(host_path);
            }
            dir = exe_dir.parent();
        }
    }

    if let Ok(path) = which::which(HOST_BINARY_NAME) {
        return Ok(path);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    for profile in &["debug", "release"] {
        let path = manifest_dir
            .join("..")
            .join("..")
            .join("target")
            .join(profile)
            .join(HOST_BINARY_NAME);
        if path.exists() {
            return Ok(path.canonicalize().unwrap_or(path));
        }
    }

    Err(Error::HostNotFound(format!(
        "could not find {}. Set RUNBOX_HOST_PATH or ensure it's in PATH.",
        HOST_BINARY_NAME
    )))
}

/// Executes compiled libraries in child host processes.
pub struct IsolatedRunner {
    sessions: Arc<SessionRegistry>,
    temp_root: PathBuf,
    host_path: Option<PathBuf>,
    limiter: Arc<Semaphore>,
}

impl IsolatedRunner {
    /// Create a runner with sandboxes under `temp_root`.
    pub fn new(sessions: Arc<SessionRegistry>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions,
            temp_root: temp_root.into(),
            host_path: None,
            limiter: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_PROCESSES)),
        }
    }

    /// Use a specific host binary instead of searching for one.
    pub fn with_host_path(mut self, path: Option<PathBuf>) -> Self {
        self.host_path = path;
        self
    }

    /// Bound the number of concurrently running child processes.
    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.limiter = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    /// Create the private working directory for one run.
    pub fn prepare_sandbox(&self) -> Result<SandboxDir> {
        SandboxDir::create(&self.temp_root, "run")
    }

    /// Launch the host on `binary` inside `sandbox` and stream its output.
    ///
    /// The sandbox is removed before returning, whatever the outcome.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        sandbox: SandboxDir,
        binary: &Path,
        references: &[Reference],
        decision: ExecutionModeDecision,
        ticket: Option<&SessionTicket>,
        abort: &AbortHandle,
        sink: Arc<dyn OutputSink>,
    ) -> RunStatus {
        let status = self
            .run_in_sandbox(&sandbox, binary, references, decision, ticket, abort, sink)
            .await
            .unwrap_or_else(RunStatus::Faulted);
        sandbox.remove();
        status
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_in_sandbox(
        &self,
        sandbox: &SandboxDir,
        binary: &Path,
        references: &[Reference],
        decision: ExecutionModeDecision,
        ticket: Option<&SessionTicket>,
        abort: &AbortHandle,
        sink: Arc<dyn OutputSink>,
    ) -> Result<RunStatus> {
        copy_references(references, sandbox.path());

        let host = find_host_binary(self.host_path.as_deref())?;

        let _permit = tokio::select! {
            permit = self.limiter.clone().acquire_owned() => permit
                .map_err(|_| Error::ProcessStart("process limiter closed".to_string()))?,
            _ = abort.aborted() => return Ok(RunStatus::Cancelled),
        };
        if abort.is_aborted() {
            return Ok(RunStatus::Cancelled);
        }

        let mut cmd = Command::new(&host);
        cmd.arg("--assembly")
            .arg(binary)
            .arg("--workingDirectory")
            .arg(sandbox.path())
            .arg("--requiresSta")
            .arg(if decision.requires_main_thread { "true" } else { "false" })
            .current_dir(sandbox.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            Error::ProcessStart(format!("failed to spawn '{}': {}", host.display(), e))
        })?;

        let (handle, writer) = match ChildProcessHandle::attach(&mut child) {
            Ok(attached) => attached,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };
        let handle = Arc::new(handle);
        if let Some(ticket) = ticket {
            self.sessions.attach_child(ticket, handle.clone());
        }

        tracing::info!(
            "Started {} (pid {}) for {} program",
            HOST_BINARY_NAME,
            handle.pid(),
            decision.kind.as_str()
        );

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let sink = sink.clone();
            pumps.push(tokio::spawn(async move { pump(stdout, |text| sink.output(text)).await }));
        }
        if let Some(stderr) = child.stderr.take() {
            let sink = sink.clone();
            pumps.push(tokio::spawn(async move { pump(stderr, |text| sink.error(text)).await }));
        }

        let exit = tokio::select! {
            status = child.wait() => Some(status),
            _ = abort.aborted() => None,
        };

        let status = match exit {
            Some(status) => {
                handle.kill_orphans();
                handle.mark_exited();
                let status = status?;
                RunStatus::Exited(status.code().unwrap_or(-1))
            }
            None => {
                handle.kill_tree();
                let _ = child.wait().await;
                handle.mark_exited();
                RunStatus::Cancelled
            }
        };

        for pump in pumps {
            match tokio::time::timeout(PUMP_DRAIN_TIMEOUT, pump).await {
                Ok(_) => {}
                Err(_) => tracing::warn!("Output of pid {} still open after exit", handle.pid()),
            }
        }
        writer.abort();

        Ok(status)
    }
}

/// Copy reference binaries into the sandbox. Failures are logged and ignored.
fn copy_references(references: &[Reference], sandbox: &Path) {
    for reference in references {
        let mut files = vec![reference.path.clone()];

        // Native libraries shipped next to the rlib under the same crate name.
        if let Some(dir) = reference.search_dir() {
            let native_prefix = format!("lib{}", reference.crate_name);
            if let Ok(entries) = std::fs::read_dir(dir) {
                files.extend(entries.flatten().map(|e| e.path()).filter(|path| {
                    path.extension().is_some_and(|ext| ext == dylib_extension())
                        && path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with(&native_prefix) || n.starts_with(&reference.crate_name))
                }));
            }
        }

        for file in files {
            let Some(name) = file.file_name() else { continue };
            if let Err(e) = std::fs::copy(&file, sandbox.join(name)) {
                tracing::warn!("Failed to copy {} into sandbox: {}", file.display(), e);
            }
        }
    }
}

async fn pump<R, F>(mut stream: R, forward: F)
where
    R: AsyncRead + Unpin,
    F: Fn(&str),
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut decoder = Utf8ChunkDecoder::new();
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() {
                    forward(&text);
                }
            }
            Err(e) => {
                tracing::debug!("Output pump stopped: {}", e);
                break;
            }
        }
    }
    let tail = decoder.finish();
    if !tail.is_empty() {
        forward(&tail);
    }
}
