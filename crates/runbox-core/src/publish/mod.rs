//! Publish pipeline: source files → self-contained executable → zip.
//!
//! ```text
//! PublishRequest
//!     │
//!     ├── project/  (Cargo.toml + src/, generated)
//!     ├── cargo fetch                          ─┐ output streamed
//!     ├── cargo build --release --target <T>   ─┘ line by line
//!     ├── publish/  (executable + native libraries)
//!     └── <name>.zip                           only file left afterwards
//! ```

mod archive;
mod locate;
mod project;

pub use archive::zip_directory;
pub use locate::{executable_name, locate_executable, sibling_native_libraries};
pub use project::{ProjectSpec, write_project};

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::classify::{ProjectKind, contains_gui_marker};
use crate::compile::{ToolchainManager, sanitize_package_name};
use crate::error::{Error, Result};
use crate::execute::{AbortHandle, ProcessTreeKiller};
use crate::output::OutputSink;
use crate::paths::SandboxDir;
use crate::request::{LanguageVersion, PublishRequest, normalize_files};

/// Output name used when the request does not give one.
pub const DEFAULT_OUTPUT_NAME: &str = "app";

/// Result of a publish.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    /// Whether an artifact was produced.
    pub success: bool,
    /// Path of the zip archive.
    pub artifact_path: Option<PathBuf>,
    /// Archive size in bytes.
    pub size_bytes: u64,
    /// Failure description.
    pub error: Option<String>,
    /// Build output lines.
    #[serde(skip)]
    pub log: Vec<String>,
}

impl PublishResult {
    fn failure(error: String, log: Vec<String>) -> Self {
        Self {
            success: false,
            error: Some(error),
            log,
            ..Default::default()
        }
    }
}

/// Builds downloadable artifacts with cargo.
pub struct PublishPipeline {
    toolchain: ToolchainManager,
    temp_root: PathBuf,
}

impl PublishPipeline {
    /// Create a pipeline with work directories under `temp_root`.
    pub fn new(toolchain: ToolchainManager, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            toolchain,
            temp_root: temp_root.into(),
        }
    }

    /// Publish `request`, streaming build output to `sink`.
    ///
    /// Never fails: errors are reported in the returned [`PublishResult`].
    /// On success the work directory is kept holding just the archive, so
    /// it can be served; the caller owns its removal.
    pub async fn publish(&self, request: PublishRequest, sink: Arc<dyn OutputSink>) -> PublishResult {
        let log = Arc::new(Mutex::new(Vec::new()));

        let outcome = match SandboxDir::create(&self.temp_root, "publish") {
            Ok(work) => match self.publish_in(work.path(), &request, &sink, &log).await {
                Ok(artifact) => {
                    work.keep();
                    Ok(artifact)
                }
                Err(e) => {
                    work.remove();
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        let log = std::mem::take(&mut *log.lock().unwrap_or_else(PoisonError::into_inner));
        match outcome {
            Ok((artifact_path, size_bytes)) => {
                tracing::info!("Published {} ({} bytes)", artifact_path.display(), size_bytes);
                PublishResult {
                    success: true,
                    artifact_path: Some(artifact_path),
                    size_bytes,
                    error: None,
                    log,
                }
            }
            Err(e) => {
                tracing::warn!("Publish failed: {}", e);
                let message = match e {
                    Error::Publish(message) => message,
                    Error::Aborted => "Publish cancelled".to_string(),
                    other => other.to_string(),
                };
                PublishResult::failure(message, log)
            }
        }
    }

    async fn publish_in(
        &self,
        work: &Path,
        request: &PublishRequest,
        sink: &Arc<dyn OutputSink>,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Result<(PathBuf, u64)> {
        let files = normalize_files(request.files.clone());
        let edition = LanguageVersion::parse_selector(request.language_version.as_deref())?;

        let declared = ProjectKind::from_declared(&request.project_type);
        let combined: String = files.iter().map(|f| f.content.as_str()).collect::<Vec<_>>().join("\n");
        let kind = if declared == ProjectKind::Console && contains_gui_marker(&combined) {
            ProjectKind::DesktopGui
        } else {
            declared
        };

        let output_name = if request.output_name.trim().is_empty() {
            DEFAULT_OUTPUT_NAME
        } else {
            request.output_name.trim()
        };
        let name = sanitize_package_name(output_name.trim_end_matches(".zip"));
        let target = request
            .target
            .clone()
            .unwrap_or_else(|| self.toolchain.host_triple().to_string());
        let cargo = self.toolchain.cargo_path()?.to_path_buf();

        let project_dir = work.join("project");
        write_project(
            &project_dir,
            &files,
            &ProjectSpec {
                name: &name,
                edition,
                kind,
                target: &target,
                packages: &request.packages,
            },
        )?;
        tracing::info!("Publishing {} program '{}' for {}", kind.as_str(), name, target);

        let step = |args: &[&str]| {
            let mut cmd = Command::new(&cargo);
            cmd.args(args)
                .current_dir(&project_dir)
                .env("CARGO_TARGET_DIR", project_dir.join("target"));
            if needs_static_crt(&target) {
                cmd.env("RUSTFLAGS", "-C target-feature=+crt-static");
            }
            cmd
        };

        run_step("restore", step(&["fetch"]), sink, log, &request.abort).await?;
        run_step(
            "publish",
            step(&["build", "--release", "--target", &target]),
            sink,
            log,
            &request.abort,
        )
        .await?;

        let release_dir = project_dir.join("target").join(&target).join("release");
        let executable = locate_executable(&release_dir, &name, &target).ok_or_else(|| {
            Error::Publish(format!("no executable found in {}", release_dir.display()))
        })?;

        let publish_dir = work.join("publish");
        std::fs::create_dir_all(&publish_dir)?;
        let exe_file_name = executable
            .file_name()
            .ok_or_else(|| Error::Publish("executable has no file name".to_string()))?;
        std::fs::copy(&executable, publish_dir.join(exe_file_name))?;
        for lib in sibling_native_libraries(&release_dir) {
            if let Some(file_name) = lib.file_name() {
                if let Err(e) = std::fs::copy(&lib, publish_dir.join(file_name)) {
                    tracing::warn!("Failed to copy {}: {}", lib.display(), e);
                }
            }
        }

        let archive_path = work.join(format!("{}.zip", name));
        let size = zip_directory(&publish_dir, &archive_path)?;

        for dir in [&project_dir, &publish_dir] {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                tracing::warn!("Failed to remove {}: {}", dir.display(), e);
            }
        }
        Ok((archive_path, size))
    }
}

/// Targets whose binaries should link the C runtime statically.
fn needs_static_crt(target: &str) -> bool {
    target.ends_with("-windows-msvc") || target.contains("-musl")
}

/// Run one cargo step, streaming both output streams line by line.
///
/// A non-zero exit fails with the step's combined output.
async fn run_step(
    label: &str,
    mut cmd: Command,
    sink: &Arc<dyn OutputSink>,
    log: &Arc<Mutex<Vec<String>>>,
    abort: &AbortHandle,
) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Toolchain(format!("Failed to run cargo ({}): {}", label, e)))?;
    let killer = child.id().map(ProcessTreeKiller::new);

    let step_lines = Arc::new(Mutex::new(Vec::new()));
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(tokio::spawn(forward_lines(stdout, sink.clone(), step_lines.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(forward_lines(stderr, sink.clone(), step_lines.clone())));
    }

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = abort.aborted() => {
            if let Some(killer) = &killer {
                killer.kill_tree();
            }
            let _ = child.wait().await;
            return Err(Error::Aborted);
        }
    };
    for pump in pumps {
        let _ = pump.await;
    }

    let lines = std::mem::take(&mut *step_lines.lock().unwrap_or_else(PoisonError::into_inner));
    let combined = lines.join("\n");
    log.lock().unwrap_or_else(PoisonError::into_inner).extend(lines);

    if status.success() {
        Ok(())
    } else {
        Err(Error::Publish(format!(
            "{} step failed ({}):\n{}",
            label, status, combined
        )))
    }
}

async fn forward_lines<R>(stream: R, sink: Arc<dyn OutputSink>, lines: Arc<Mutex<Vec<String>>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        sink.output(&format!("{}\n", line));
        lines.lock().unwrap_or_else(PoisonError::into_inner).push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CollectingSink;
    use crate::request::SourceFile;
    use tempfile::TempDir;

    #[test]
    fn test_needs_static_crt() {
        assert!(needs_static_crt("x86_64-pc-windows-msvc"));
        assert!(needs_static_crt("x86_64-unknown-linux-musl"));
        assert!(!needs_static_crt("x86_64-unknown-linux-gnu"));
        assert!(!needs_static_crt("x86_64-pc-windows-gnu"));
    }

    #[tokio::test]
    async fn test_unknown_edition_fails_without_artifact() {
        let root = TempDir::new().unwrap();
        let pipeline = PublishPipeline::new(ToolchainManager::new().unwrap(), root.path());
        let request = PublishRequest {
            files: vec![SourceFile::new("main.rs", "fn main() {}").entry()],
            language_version: Some("1999".to_string()),
            output_name: "hello".to_string(),
            ..Default::default()
        };
        let result = pipeline.publish(request, Arc::new(CollectingSink::new())).await;
        assert!(!result.success);
        assert!(result.artifact_path.is_none());
        assert!(result.error.unwrap().contains("1999"));
        // Failed publishes leave nothing behind.
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    #[ignore = "Runs a full cargo release build"]
    async fn test_publish_hello_world() {
        let root = TempDir::new().unwrap();
        let pipeline = PublishPipeline::new(ToolchainManager::new().unwrap(), root.path());
        let sink = Arc::new(CollectingSink::new());
        let request = PublishRequest {
            files: Vec::new(),
            output_name: "hello".to_string(),
            ..Default::default()
        };
        let result = pipeline.publish(request, sink).await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.size_bytes > 0);
        let archive = result.artifact_path.unwrap();
        assert!(archive.exists());

        // Build trees are gone; only the archive stays in the work dir.
        let work = archive.parent().unwrap();
        let left: Vec<_> = std::fs::read_dir(work)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("hello.zip")]);
    }
}
