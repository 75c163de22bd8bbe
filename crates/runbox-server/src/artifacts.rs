//! Published archives kept for download.
//!
//! Every publish gets its own work directory, so archives are keyed by
//! `<work-dir>/<file>`: two publishes with the same output name never
//! shadow each other. The store is bounded; evicting an archive deletes
//! its work directory.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

/// Archives retained before the oldest is evicted.
pub const MAX_RETAINED_ARTIFACTS: usize = 32;

/// Bounded registry of downloadable archives.
#[derive(Debug)]
pub struct ArtifactStore {
    capacity: usize,
    paths: FxHashMap<String, PathBuf>,
    order: VecDeque<String>,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::with_capacity(MAX_RETAINED_ARTIFACTS)
    }
}

impl ArtifactStore {
    /// Store keeping at most `capacity` archives.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            paths: FxHashMap::default(),
            order: VecDeque::new(),
        }
    }

    /// Register `archive`; returns its download key, `<work-dir>/<file>`.
    ///
    /// Returns `None` for a path without a file name or parent directory.
    pub fn register(&mut self, archive: &Path) -> Option<String> {
        let file = archive.file_name()?.to_str()?;
        let dir = archive.parent()?.file_name()?.to_str()?;
        let key = format!("{}/{}", dir, file);

        if self.paths.insert(key.clone(), archive.to_path_buf()).is_none() {
            self.order.push_back(key.clone());
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                if let Some(path) = self.paths.remove(&oldest) {
                    remove_work_dir(&path);
                }
            }
        }
        Some(key)
    }

    /// Archive path for `id` (the work dir name) and `file`.
    pub fn get(&self, id: &str, file: &str) -> Option<PathBuf> {
        self.paths.get(&format!("{}/{}", id, file)).cloned()
    }

    /// Number of retained archives.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn remove_work_dir(archive: &Path) {
    let Some(dir) = archive.parent() else {
        return;
    };
    match std::fs::remove_dir_all(dir) {
        Ok(()) => tracing::debug!("Evicted published archive {}", archive.display()),
        Err(e) => tracing::warn!("Failed to remove {}: {}", dir.display(), e),
    }
}
