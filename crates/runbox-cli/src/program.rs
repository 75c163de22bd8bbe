//! Program arguments shared by `run` and `publish`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use runbox_core::{PackageRef, SourceFile};

/// Source files and build options for a program.
#[derive(Args, Debug, Clone)]
pub struct ProgramArgs {
    /// Source files; the first one is the entry file
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Project type (console, web, gui, ...)
    #[arg(long, default_value = "console")]
    pub project_type: String,

    /// Language edition (2015, 2018, 2021, 2024, latest)
    #[arg(long)]
    pub edition: Option<String>,

    /// Package dependency as `id@version`; repeatable
    #[arg(long = "package", value_parser = parse_package)]
    pub packages: Vec<PackageRef>,
}

impl ProgramArgs {
    /// Read the source files from disk.
    pub fn load_sources(&self) -> anyhow::Result<Vec<SourceFile>> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Source file not found: {}", path.display()))?;
                let file = SourceFile::new(file_name(path), content);
                Ok(if i == 0 { file.entry() } else { file })
            })
            .collect()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse `id@version`.
pub fn parse_package(value: &str) -> Result<PackageRef, String> {
    match value.split_once('@') {
        Some((id, version)) if !id.trim().is_empty() && !version.trim().is_empty() => {
            Ok(PackageRef::new(id.trim(), version.trim()))
        }
        _ => Err(format!("expected `id@version`, got `{}`", value)),
    }
}
