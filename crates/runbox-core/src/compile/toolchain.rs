//! Toolchain discovery for guest compilation and publishing.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Locates `rustc` and `cargo` and answers questions about them.
#[derive(Debug, Clone)]
pub struct ToolchainManager {
    /// Path to rustc
    rustc_path: PathBuf,

    /// Path to cargo (needed only for publishing)
    cargo_path: Option<PathBuf>,

    /// Toolchain version string
    version: String,

    /// Host target triple
    host_triple: String,
}

impl ToolchainManager {
    /// Create a new toolchain manager, detecting available tools.
    pub fn new() -> Result<Self> {
        let rustc_path = Self::find_rustc()?;
        let cargo_path = which::which("cargo").ok();
        let verbose = Self::rustc_verbose_version(&rustc_path)?;
        let version = verbose.lines().next().unwrap_or_default().trim().to_string();
        let host_triple = Self::parse_host_triple(&verbose)
            .ok_or_else(|| Error::Toolchain("rustc -vV did not report a host triple".to_string()))?;

        tracing::debug!("Using {} ({}) for host {}", rustc_path.display(), version, host_triple);

        Ok(Self {
            rustc_path,
            cargo_path,
            version,
            host_triple,
        })
    }

    /// Get the rustc path.
    pub fn rustc_path(&self) -> &Path {
        &self.rustc_path
    }

    /// Get the cargo path.
    ///
    /// # Errors
    /// Returns an error if cargo was not found in PATH.
    pub fn cargo_path(&self) -> Result<&Path> {
        self.cargo_path
            .as_deref()
            .ok_or_else(|| Error::Toolchain("cargo not found in PATH".to_string()))
    }

    /// Get the toolchain version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Target triple of the machine running the engine.
    pub fn host_triple(&self) -> &str {
        &self.host_triple
    }

    /// Find rustc, honouring `RUSTC` like cargo does.
    fn find_rustc() -> Result<PathBuf> {
        if let Some(rustc) = std::env::var_os("RUSTC") {
            let path = PathBuf::from(rustc);
            if path.exists() {
                return Ok(path);
            }
            if let Ok(found) = which::which(&path) {
                return Ok(found);
            }
        }
        which::which("rustc").map_err(|_| Error::Toolchain("rustc not found in PATH".to_string()))
    }

    /// Run `rustc -vV`.
    fn rustc_verbose_version(rustc: &Path) -> Result<String> {
        let output = Command::new(rustc)
            .arg("-vV")
            .output()
            .map_err(|e| Error::Toolchain(format!("Failed to run rustc: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Toolchain("Failed to get rustc version".to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn parse_host_triple(verbose_version: &str) -> Option<String> {
        verbose_version
            .lines()
            .find_map(|line| line.strip_prefix("host:"))
            .map(|triple| triple.trim().to_string())
            .filter(|triple| !triple.is_empty())
    }
}
