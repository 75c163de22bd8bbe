//! Publish command implementation for the runbox CLI.
//!
//! Builds a program as a standalone release executable, zips it, and copies
//! the archive to the destination directory.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use runbox_core::{EngineConfig, ExecutionEngine, PublishRequest};

use crate::colors;
use crate::program::ProgramArgs;
use crate::terminal::Terminal;

/// Publish a program.
pub async fn execute(
    terminal: &Terminal,
    program: ProgramArgs,
    output: String,
    target: Option<String>,
    dest: &Path,
) -> anyhow::Result<()> {
    let files = program.load_sources()?;
    let engine = ExecutionEngine::new(EngineConfig::from_env())?;

    let request = PublishRequest {
        files,
        packages: program.packages,
        language_version: program.edition,
        project_type: program.project_type,
        output_name: output,
        target,
        ..Default::default()
    };

    eprintln!("{}Publishing{} {}", colors::BOLD, colors::RESET, request.output_name);
    let result = engine.publish(request, Arc::new(terminal.sink()?)).await;

    if !result.success {
        anyhow::bail!(
            "{}Publish failed:{} {}",
            colors::RED,
            colors::RESET,
            result.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let artifact = result
        .artifact_path
        .context("Publish succeeded without an artifact")?;
    let file_name = artifact
        .file_name()
        .context("Artifact path has no file name")?;

    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let copied = dest.join(file_name);
    std::fs::copy(&artifact, &copied)
        .with_context(|| format!("Failed to copy {} to {}", artifact.display(), copied.display()))?;

    // The work directory is only kept around for server downloads.
    if let Some(work_dir) = artifact.parent() {
        if work_dir.starts_with(&engine.config().temp_root) {
            if let Err(e) = std::fs::remove_dir_all(work_dir) {
                tracing::warn!("Failed to remove {}: {}", work_dir.display(), e);
            }
        }
    }

    println!(
        "{}Published{} {} ({} bytes)",
        colors::GREEN,
        colors::RESET,
        copied.display(),
        result.size_bytes
    );

    Ok(())
}
