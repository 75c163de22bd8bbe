//! Package reference resolution.
//!
//! A requested package is resolved to a prebuilt `rlib` that rustc links
//! with `--extern`. Resolution is a seam: the engine only sees
//! [`ReferenceResolver`], and the default implementation scans a library
//! directory.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::request::PackageRef;

/// A compiled crate the guest program links against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Name the guest uses in `use` paths.
    pub crate_name: String,
    /// Path of the `rlib`.
    pub path: PathBuf,
}

impl Reference {
    /// Directory holding the reference, passed to rustc as a search path.
    pub fn search_dir(&self) -> Option<&Path> {
        self.path.parent()
    }
}

/// Resolves requested packages to linkable references.
pub trait ReferenceResolver: Send + Sync {
    /// Resolve one package.
    ///
    /// # Errors
    /// Returns [`Error::PackageNotFound`] when the package is unavailable.
    fn resolve(&self, package: &PackageRef) -> Result<Reference>;

    /// References every guest program links against.
    fn base_references(&self) -> Vec<Reference> {
        Vec::new()
    }

    /// Base references followed by every requested package.
    ///
    /// # Errors
    /// Fails on the first package that does not resolve.
    fn resolve_all(&self, packages: &[PackageRef]) -> Result<Vec<Reference>> {
        let mut references = self.base_references();
        for package in packages {
            references.push(self.resolve(package)?);
        }
        Ok(references)
    }
}

/// Resolver that links only the standard library.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdOnlyResolver;

impl ReferenceResolver for StdOnlyResolver {
    fn resolve(&self, package: &PackageRef) -> Result<Reference> {
        Err(Error::PackageNotFound {
            id: package.id.clone(),
            version: package.version.clone(),
        })
    }
}

/// Resolver backed by a directory of prebuilt `rlib`s.
///
/// Accepts `lib<name>.rlib` and cargo's hashed `lib<name>-<hash>.rlib`.
/// Version requirements are not checked against the file; the directory is
/// expected to hold one build per crate.
pub struct LibraryDirResolver {
    dir: PathBuf,
    cache: RwLock<FxHashMap<(String, String), Reference>>,
}

impl LibraryDirResolver {
    /// Create a resolver over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// The scanned directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn find_rlib(&self, crate_name: &str) -> Option<PathBuf> {
        let exact = self.dir.join(format!("lib{}.rlib", crate_name));
        if exact.is_file() {
            return Some(exact);
        }

        let hashed_prefix = format!("lib{}-", crate_name);
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&hashed_prefix) && n.ends_with(".rlib"))
            })
            .collect();
        // Deterministic pick when several hashed builds exist.
        candidates.sort();
        candidates.pop()
    }
}

impl ReferenceResolver for LibraryDirResolver {
    fn resolve(&self, package: &PackageRef) -> Result<Reference> {
        let key = (package.id.clone(), package.version.clone());

        if let Ok(cache) = self.cache.read() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }

        let crate_name = package.crate_name();
        let path = self.find_rlib(&crate_name).ok_or_else(|| Error::PackageNotFound {
            id: package.id.clone(),
            version: package.version.clone(),
        })?;

        tracing::debug!("Resolved {}@{} to {}", package.id, package.version, path.display());

        let reference = Reference { crate_name, path };
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, reference.clone());
        }
        Ok(reference)
    }
}
