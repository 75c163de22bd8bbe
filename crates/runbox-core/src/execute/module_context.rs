//! Disposable module contexts.
//!
//! Every in-process run loads its library into a fresh [`ModuleContext`]:
//! the bytes are written to a private temporary directory under a unique
//! file name, loaded, run, and unloaded when the context drops. Nothing a
//! run loads outlives it.

use std::path::{Path, PathBuf};

use libloading::Library;
use tempfile::TempDir;

use crate::compile::{GUEST_CRATE_NAME, dylib_extension, dylib_prefix};
use crate::error::Result;

use super::ffi::{GuestOutcome, call_entry};

/// A loaded guest library with its own backing storage.
pub struct ModuleContext {
    // Drop order matters: unload the library before deleting its file.
    library: Library,
    path: PathBuf,
    _dir: Option<TempDir>,
}

impl ModuleContext {
    /// Load a library from bytes into a new context.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("runbox-module-").tempdir()?;
        let file_name = format!(
            "{}{}_{}.{}",
            dylib_prefix(),
            GUEST_CRATE_NAME,
            uuid::Uuid::new_v4().simple(),
            dylib_extension()
        );
        let path = dir.path().join(file_name);
        std::fs::write(&path, bytes)?;

        let library = unsafe { Library::new(&path)? };
        tracing::debug!("Loaded module context from {}", path.display());

        Ok(Self {
            library,
            path,
            _dir: Some(dir),
        })
    }

    /// Load a library that already lives on disk. The file is not removed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let library = unsafe { Library::new(path)? };
        Ok(Self {
            library,
            path: path.to_path_buf(),
            _dir: None,
        })
    }

    /// Location of the loaded file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the guest entry point. Blocks until it returns.
    pub fn run(&self) -> Result<GuestOutcome> {
        call_entry(&self.library)
    }
}

impl Drop for ModuleContext {
    fn drop(&mut self) {
        tracing::debug!("Unloading module context {}", self.path.display());
    }
}
