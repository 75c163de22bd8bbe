//! Guest program compiler.
//!
//! Drives `rustc` directly to build the submitted files into a `cdylib`
//! exporting the entry shim from [`super::entry`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::request::{LanguageVersion, SourceFile, normalize_files};

use super::entry::{generate_shim, scan_entry_file};
use super::errors::{Diagnostic, has_errors, parse_rustc_output};
use super::references::Reference;
use super::toolchain::ToolchainManager;
use super::types::{
    CompileOutcome, CompiledArtifact, CompilerConfig, GUEST_CRATE_NAME, OutputKind,
    guest_library_name,
};

/// Compiles guest programs to dynamic libraries.
#[derive(Debug, Clone)]
pub struct RustcCompiler {
    /// Compiler configuration
    config: CompilerConfig,

    /// Toolchain manager
    toolchain: ToolchainManager,
}

impl RustcCompiler {
    /// Create a new compiler.
    pub fn new(config: CompilerConfig, toolchain: ToolchainManager) -> Self {
        Self { config, toolchain }
    }

    /// The toolchain in use.
    pub fn toolchain(&self) -> &ToolchainManager {
        &self.toolchain
    }

    /// Compile `files` into a guest library.
    ///
    /// Compile errors are reported through [`CompileOutcome::diagnostics`];
    /// `Err` is reserved for infrastructure failures (rustc missing, disk
    /// errors). Blocking; run it off the async runtime.
    pub fn compile(
        &self,
        files: &[SourceFile],
        references: &[Reference],
        version: LanguageVersion,
        output: &OutputKind,
    ) -> Result<CompileOutcome> {
        let start = Instant::now();
        let files = normalize_files(files.to_vec());

        let built = match output {
            OutputKind::InMemory => {
                let scratch = tempfile::Builder::new().prefix("runbox-compile-").tempdir()?;
                match self.compile_in(scratch.path(), &files, references, version, false)? {
                    Ok((binary, warnings)) => {
                        let bytes = fs::read(&binary)?;
                        Ok((CompiledArtifact::InMemory { bytes }, warnings))
                    }
                    Err(diagnostics) => Err(diagnostics),
                }
            }
            OutputKind::OnDisk { dir } => {
                fs::create_dir_all(dir)?;
                self.compile_in(dir, &files, references, version, true)?
                    .map(|(binary, warnings)| {
                        let symbols = find_symbols(&binary);
                        (CompiledArtifact::OnDisk { binary, symbols }, warnings)
                    })
            }
        };

        let (artifact, diagnostics) = match built {
            Ok((artifact, warnings)) => (Some(artifact), warnings),
            Err(diagnostics) => (None, diagnostics),
        };
        let outcome = CompileOutcome {
            artifact,
            diagnostics,
            compile_time_ms: start.elapsed().as_millis() as u64,
        };

        tracing::debug!(
            "Compiled {} file(s) in {}ms (success: {})",
            files.len(),
            outcome.compile_time_ms,
            outcome.is_success()
        );
        Ok(outcome)
    }

    /// Write sources under `dir/src` and run rustc, emitting into `dir`.
    ///
    /// The inner `Result` carries compile diagnostics: `Ok` holds the binary
    /// path plus any warnings, `Err` holds the diagnostics of a failed build.
    fn compile_in(
        &self,
        dir: &Path,
        files: &[SourceFile],
        references: &[Reference],
        version: LanguageVersion,
        on_disk: bool,
    ) -> Result<std::result::Result<(PathBuf, Vec<Diagnostic>), Vec<Diagnostic>>> {
        let src_dir = dir.join("src");
        fs::create_dir_all(&src_dir)?;

        let (entry_name, entry_lines) = write_sources(&src_dir, files)?;
        let binary = dir.join(guest_library_name());

        let mut cmd = Command::new(self.toolchain.rustc_path());
        cmd.current_dir(&src_dir)
            .arg(&entry_name)
            .arg("--crate-type=cdylib")
            .arg(format!("--crate-name={}", GUEST_CRATE_NAME))
            .arg(format!("--edition={}", version.as_edition()))
            .arg("--error-format=json")
            .arg("-o")
            .arg(&binary);

        // Optimization level
        cmd.arg("-C").arg(format!("opt-level={}", self.config.opt_level));

        // Debug info; on-disk builds always carry separate symbols
        if on_disk {
            cmd.arg("-C").arg("debuginfo=2");
            cmd.arg("-C").arg("split-debuginfo=packed");
        } else if self.config.debug_info {
            cmd.arg("-C").arg("debuginfo=2");
        }

        let mut search_dirs = BTreeSet::new();
        for reference in references {
            if let Some(parent) = reference.search_dir() {
                search_dirs.insert(parent.to_path_buf());
            }
            cmd.arg("--extern")
                .arg(format!("{}={}", reference.crate_name, reference.path.display()));
        }
        for search_dir in &search_dirs {
            cmd.arg("-L").arg(format!("dependency={}", search_dir.display()));
        }

        // Extra flags
        for flag in &self.config.extra_rustc_flags {
            cmd.arg(flag);
        }

        let output = cmd
            .output()
            .map_err(|e| Error::Toolchain(format!("Failed to run rustc: {}", e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostics = parse_rustc_output(&stderr);
        for diagnostic in &mut diagnostics {
            diagnostic.mark_generated(&entry_name, entry_lines);
        }

        if output.status.success() && !has_errors(&diagnostics) {
            return Ok(Ok((binary, diagnostics)));
        }

        if has_errors(&diagnostics) {
            Ok(Err(diagnostics))
        } else {
            // Fallback if JSON parsing failed
            let raw = stderr.trim();
            let message = if raw.is_empty() {
                format!("rustc exited with {}", output.status)
            } else {
                raw.to_string()
            };
            Ok(Err(vec![Diagnostic::simple(message)]))
        }
    }
}

/// Write every file by basename into `src_dir`; returns the entry file name.
///
/// The entry file gets the shim appended. Other files are written as
/// `<module>.rs` so the generated `mod` declarations find them. Returns the
/// entry file name and the number of lines the submitted entry file spans.
fn write_sources(src_dir: &Path, files: &[SourceFile]) -> Result<(String, usize)> {
    let Some(entry) = files.first() else {
        return Err(Error::Compilation {
            message: "no source files".to_string(),
        });
    };

    let modules: Vec<String> = files[1..].iter().map(SourceFile::module_name).collect();
    for (file, module) in files[1..].iter().zip(&modules) {
        fs::write(src_dir.join(format!("{}.rs", module)), &file.content)?;
    }

    let entry_name = basename(&entry.name);
    let scan = scan_entry_file(&entry.content);
    let mut content = entry.content.clone();
    content.push_str(&generate_shim(&scan, &modules));
    fs::write(src_dir.join(&entry_name), content)?;

    Ok((entry_name, entry.content.lines().count().max(1)))
}

fn basename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() {
        crate::request::DEFAULT_FILE_NAME.to_string()
    } else {
        base.to_string()
    }
}

/// Locate the separate debug symbols rustc wrote next to `binary`.
fn find_symbols(binary: &Path) -> Option<PathBuf> {
    let dir = binary.parent()?;
    let file_name = binary.file_name()?.to_string_lossy().into_owned();
    let stem = binary.file_stem()?.to_string_lossy().into_owned();

    [
        format!("{}.dwp", file_name),
        format!("{}.dSYM", file_name),
        format!("{}.pdb", stem),
        format!("{}.dwp", stem),
        format!("{}.pdb", GUEST_CRATE_NAME),
        format!("{}.dwp", GUEST_CRATE_NAME),
    ]
    .into_iter()
    .map(|candidate| dir.join(candidate))
    .find(|path| path.exists())
}
