//! Zip packaging of the publish directory.

use std::fs::File;
use std::io;
use std::path::Path;

use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::Result;

/// Zip everything under `source_dir` into `archive_path`.
///
/// Entry names are relative to `source_dir` with `/` separators. Unix file
/// modes are preserved so the binary stays executable after extraction.
/// Returns the archive size in bytes.
pub fn zip_directory(source_dir: &Path, archive_path: &Path) -> Result<u64> {
    let file = File::create(archive_path)?;
    let mut writer = ZipWriter::new(file);

    let mut entries: Vec<_> = WalkDir::new(source_dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in entries {
        let Ok(relative) = entry.path().strip_prefix(source_dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{}/", name), file_options())?;
            continue;
        }

        let options = match unix_mode(entry.path()) {
            Some(mode) => file_options().unix_permissions(mode),
            None => file_options(),
        };
        writer.start_file(name, options)?;
        let mut input = File::open(entry.path())?;
        io::copy(&mut input, &mut writer)?;
    }

    writer.finish()?;
    Ok(std::fs::metadata(archive_path)?.len())
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

#[cfg(unix)]
fn unix_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn unix_mode(_path: &Path) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_zip_directory_contains_every_file() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("app"), b"binary").unwrap();
        std::fs::create_dir(src.path().join("lib")).unwrap();
        std::fs::write(src.path().join("lib").join("libx.so"), b"native").unwrap();

        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("app.zip");
        let size = zip_directory(src.path(), &archive_path).unwrap();
        assert!(size > 0);

        let mut archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"app".to_string()));
        assert!(names.contains(&"lib/libx.so".to_string()));

        let mut content = String::new();
        archive.by_name("lib/libx.so").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "native");
    }

    #[cfg(unix)]
    #[test]
    fn test_zip_preserves_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let src = TempDir::new().unwrap();
        let bin = src.path().join("tool");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("tool.zip");
        zip_directory(src.path(), &archive_path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        let mode = archive.by_name("tool").unwrap().unix_mode().unwrap();
        assert_eq!(mode & 0o111, 0o111);
    }
}
