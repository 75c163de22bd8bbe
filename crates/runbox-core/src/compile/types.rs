//! Common types for the compilation pipeline.

use std::path::{Path, PathBuf};

use super::errors::{Diagnostic, has_errors};

/// Crate name of every compiled guest program.
pub const GUEST_CRATE_NAME: &str = "runbox_guest";

/// Configuration for the compiler.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Emit debug info for in-memory builds
    pub debug_info: bool,

    /// Optimization level (0-3)
    pub opt_level: u8,

    /// Additional rustc flags
    pub extra_rustc_flags: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            debug_info: false,
            opt_level: 0,
            extra_rustc_flags: Vec::new(),
        }
    }
}

/// Where the compiler should put its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// Compile in a scratch directory and hand back the bytes.
    InMemory,
    /// Emit binary and debug symbols straight into `dir`.
    OnDisk { dir: PathBuf },
}

/// A compiled guest program. Owned by the runner that executes it.
#[derive(Debug, Clone)]
pub enum CompiledArtifact {
    /// Library bytes, loaded into a fresh module context per run.
    InMemory { bytes: Vec<u8> },
    /// Library on disk, with separate debug symbols when produced.
    OnDisk {
        binary: PathBuf,
        symbols: Option<PathBuf>,
    },
}

impl CompiledArtifact {
    /// Path of the on-disk binary, if any.
    pub fn binary_path(&self) -> Option<&Path> {
        match self {
            Self::OnDisk { binary, .. } => Some(binary),
            Self::InMemory { .. } => None,
        }
    }
}

/// Result of a compilation.
#[derive(Debug)]
pub struct CompileOutcome {
    /// Artifact; `None` when compilation failed.
    pub artifact: Option<CompiledArtifact>,

    /// All diagnostics, errors and warnings alike.
    pub diagnostics: Vec<Diagnostic>,

    /// Compilation time in milliseconds
    pub compile_time_ms: u64,
}

impl CompileOutcome {
    /// Successful only with an artifact and no error-severity diagnostic.
    pub fn is_success(&self) -> bool {
        self.artifact.is_some() && !has_errors(&self.diagnostics)
    }

    /// Error-severity diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Platform-specific dynamic library extension.
pub fn dylib_extension() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dll"
    }
    #[cfg(target_os = "macos")]
    {
        "dylib"
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        "so"
    }
}

/// Platform-specific dynamic library prefix.
pub fn dylib_prefix() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        ""
    }
    #[cfg(not(target_os = "windows"))]
    {
        "lib"
    }
}

/// File name of the compiled guest library.
pub fn guest_library_name() -> String {
    format!("{}{}.{}", dylib_prefix(), GUEST_CRATE_NAME, dylib_extension())
}
