//! Working directory management.
//!
//! Every isolated run and every publish gets its own private directory
//! under a well-known temp root:
//!
//! ```text
//! <temp root>/                 # default: <system temp>/runbox-sandboxes
//! ├── run-1718000000000-3fa2c1d9/      # isolated-run sandbox
//! │   ├── runbox_guest.so              # compiled binary
//! │   ├── runbox_guest.so.dwp          # debug symbols (when produced)
//! │   └── libfoo-....rlib              # copied dependencies
//! └── publish-1718000000123-77ab01ee/  # publish work directory
//!     ├── project/                     # generated cargo project
//!     ├── publish/                     # collected output
//!     └── hello.zip                    # final artifact
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// Default root for sandboxes and publish directories.
pub fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("runbox-sandboxes")
}

/// Build a unique, time-stamped directory name: `<prefix>-<unix millis>-<8 hex>`.
pub fn unique_dir_name(prefix: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, millis, &suffix[..8])
}

/// A private working directory owned by exactly one run.
///
/// Removal is best effort: failures are logged and never surfaced.
#[derive(Debug)]
pub struct SandboxDir {
    path: PathBuf,
    removed: bool,
}

impl SandboxDir {
    /// Create a fresh, uniquely named directory under `temp_root`.
    ///
    /// # Errors
    /// Returns an error if directory creation fails.
    pub fn create(temp_root: &Path, prefix: &str) -> Result<Self> {
        fs::create_dir_all(temp_root)?;
        let path = temp_root.join(unique_dir_name(prefix));
        fs::create_dir(&path)?;
        tracing::debug!("Created working directory {}", path.display());
        Ok(Self {
            path,
            removed: false,
        })
    }

    /// Path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory on disk and give up ownership of it.
    pub fn keep(mut self) -> PathBuf {
        self.removed = true;
        std::mem::take(&mut self.path)
    }

    /// Recursively delete the directory, swallowing errors.
    pub fn remove(mut self) {
        self.remove_inner();
    }

    fn remove_inner(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "Failed to remove working directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for SandboxDir {
    fn drop(&mut self) {
        self.remove_inner();
    }
}
