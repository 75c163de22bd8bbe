//! Finding the produced executable and its native companions.

use std::path::{Path, PathBuf};

use crate::compile::dylib_extension;

/// Extensions of build by-products that are never the executable.
const NON_EXECUTABLE_EXTENSIONS: &[&str] = &["d", "rlib", "rmeta", "pdb", "dwp", "lib", "exp", "a", "so", "dylib", "dll"];

/// Executable file name for `name` on `target`.
pub fn executable_name(name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Locate the executable named `name` in `release_dir`.
///
/// Tries the exact platform file name, then any file whose name starts with
/// `name`, then the most plausible file: the largest one that looks like an
/// executable.
pub fn locate_executable(release_dir: &Path, name: &str, target: &str) -> Option<PathBuf> {
    let exact = release_dir.join(executable_name(name, target));
    if exact.is_file() {
        return Some(exact);
    }

    let files: Vec<PathBuf> = std::fs::read_dir(release_dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && looks_executable(path, target))
        .collect();

    let prefixed = files
        .iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(name))
        })
        .max_by_key(|path| file_size(path));
    if let Some(path) = prefixed {
        return Some(path.clone());
    }

    files.into_iter().max_by_key(|path| file_size(path))
}

/// Native libraries next to the executable that it may load at runtime.
pub fn sibling_native_libraries(release_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(release_dir) else {
        return Vec::new();
    };
    let mut libs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| ext == dylib_extension() || ext == "so" || ext == "dylib" || ext == "dll")
        })
        .collect();
    libs.sort();
    libs
}

fn looks_executable(path: &Path, target: &str) -> bool {
    let extension = path.extension().and_then(|e| e.to_str());
    if target.contains("windows") {
        return extension == Some("exe");
    }
    if extension.is_some_and(|ext| NON_EXECUTABLE_EXTENSIONS.contains(&ext)) {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        extension.is_none()
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_exec(path: &Path, size: usize) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, vec![0u8; size]).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_executable_name() {
        assert_eq!(executable_name("app", "x86_64-pc-windows-msvc"), "app.exe");
        assert_eq!(executable_name("app", "x86_64-unknown-linux-gnu"), "app");
    }

    #[cfg(unix)]
    #[test]
    fn test_exact_match_wins() {
        let dir = TempDir::new().unwrap();
        write_exec(&dir.path().join("app"), 10);
        write_exec(&dir.path().join("app-helper"), 1000);
        let found = locate_executable(dir.path(), "app", "x86_64-unknown-linux-gnu").unwrap();
        assert!(found.ends_with("app"));
    }

    #[cfg(unix)]
    #[test]
    fn test_prefix_match_then_most_plausible() {
        let dir = TempDir::new().unwrap();
        write_exec(&dir.path().join("app-1a2b"), 10);
        write_exec(&dir.path().join("other"), 1000);
        std::fs::write(dir.path().join("app.d"), b"deps").unwrap();
        let found = locate_executable(dir.path(), "app", "x86_64-unknown-linux-gnu").unwrap();
        assert!(found.ends_with("app-1a2b"));

        let found = locate_executable(dir.path(), "zzz", "x86_64-unknown-linux-gnu").unwrap();
        assert!(found.ends_with("other"));
    }

    #[test]
    fn test_nothing_to_find() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.d"), b"").unwrap();
        assert_eq!(locate_executable(dir.path(), "app", "x86_64-unknown-linux-gnu"), None);
    }

    #[test]
    fn test_sibling_native_libraries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(format!("libnative.{}", dylib_extension())), b"").unwrap();
        std::fs::write(dir.path().join("app.d"), b"").unwrap();
        let libs = sibling_native_libraries(dir.path());
        assert_eq!(libs.len(), 1);
    }
}
