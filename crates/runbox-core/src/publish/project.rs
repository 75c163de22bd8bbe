//! On-disk cargo project generated for a publish.

use std::fs;
use std::path::Path;

use crate::classify::ProjectKind;
use crate::compile::{ManifestConfig, ReleaseProfile, generate_cargo_toml, scan_entry_file};
use crate::error::Result;
use crate::request::{LanguageVersion, PackageRef, SourceFile};

/// Parameters of the generated project.
#[derive(Debug, Clone)]
pub struct ProjectSpec<'a> {
    /// Package and binary name.
    pub name: &'a str,
    /// Edition.
    pub edition: LanguageVersion,
    /// Program kind.
    pub kind: ProjectKind,
    /// Target triple.
    pub target: &'a str,
    /// Packages to depend on.
    pub packages: &'a [PackageRef],
}

/// Write `Cargo.toml` and `src/` for `files` into `project_dir`.
///
/// `files` must be normalized: the entry comes first and becomes
/// `src/main.rs`, the others become `src/<module>.rs` and are declared in
/// `main.rs` unless it already does.
pub fn write_project(project_dir: &Path, files: &[SourceFile], project: &ProjectSpec<'_>) -> Result<()> {
    let src_dir = project_dir.join("src");
    fs::create_dir_all(&src_dir)?;

    let manifest = ManifestConfig {
        name: project.name,
        version: "0.1.0",
        edition: project.edition.as_edition(),
        bin_name: Some(project.name),
        release_profile: Some(release_profile(project.kind)),
        standalone_workspace: true,
    };
    fs::write(project_dir.join("Cargo.toml"), generate_cargo_toml(&manifest, project.packages))?;

    let Some((entry, others)) = files.split_first() else {
        return Ok(());
    };

    let mut main = String::new();
    if project.kind == ProjectKind::DesktopGui && project.target.contains("windows") {
        main.push_str("#![windows_subsystem = \"windows\"]\n");
    }
    main.push_str(&entry.content);

    let declared = scan_entry_file(&entry.content).declared_modules;
    let mut missing: Vec<String> = Vec::new();
    for file in others {
        let module = file.module_name();
        fs::write(src_dir.join(format!("{}.rs", module)), &file.content)?;
        if !declared.contains(&module) {
            missing.push(module);
        }
    }
    if !missing.is_empty() {
        main.push('\n');
        for module in missing {
            main.push_str(&format!("mod {};\n", module));
        }
    }

    fs::write(src_dir.join("main.rs"), main)?;
    Ok(())
}

/// Release profile per program kind.
///
/// Console tools get the smallest self-contained binary; GUI and web
/// programs keep unwinding so a panicking handler does not abort the app.
fn release_profile(kind: ProjectKind) -> ReleaseProfile {
    match kind {
        ProjectKind::Console => ReleaseProfile::production(),
        ProjectKind::DesktopGui | ProjectKind::HostedWeb => ReleaseProfile {
            strip: true,
            ..ReleaseProfile::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_spec<'a>(kind: ProjectKind, target: &'a str, packages: &'a [PackageRef]) -> ProjectSpec<'a> {
        ProjectSpec {
            name: "hello",
            edition: LanguageVersion::Edition2021,
            kind,
            target,
            packages,
        }
    }

    #[test]
    fn test_project_layout() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            SourceFile::new("program.rs", "fn main() { util::go(); }").entry(),
            SourceFile::new("util.rs", "pub fn go() {}"),
        ];
        let packages = vec![PackageRef::new("rand", "0.8")];
        write_project(dir.path(), &files, &project_spec(ProjectKind::Console, "x86_64-unknown-linux-gnu", &packages)).unwrap();

        let manifest = fs::read_to_string(dir.path().join("Cargo.toml")).unwrap();
        assert!(manifest.contains("name = \"hello\""));
        assert!(manifest.contains("rand = \"0.8\""));
        assert!(manifest.contains("[workspace]"));

        let main = fs::read_to_string(dir.path().join("src/main.rs")).unwrap();
        assert!(main.starts_with("fn main()"));
        assert!(main.contains("mod util;"));
        assert!(dir.path().join("src/util.rs").exists());
    }

    #[test]
    fn test_gui_on_windows_hides_console() {
        let dir = TempDir::new().unwrap();
        let files = vec![SourceFile::new("main.rs", "fn main() {}").entry()];
        write_project(dir.path(), &files, &project_spec(ProjectKind::DesktopGui, "x86_64-pc-windows-msvc", &[])).unwrap();
        let main = fs::read_to_string(dir.path().join("src/main.rs")).unwrap();
        assert!(main.starts_with("#![windows_subsystem = \"windows\"]"));

        let dir = TempDir::new().unwrap();
        write_project(dir.path(), &files, &project_spec(ProjectKind::DesktopGui, "x86_64-unknown-linux-gnu", &[])).unwrap();
        let main = fs::read_to_string(dir.path().join("src/main.rs")).unwrap();
        assert!(!main.contains("windows_subsystem"));
    }

    #[test]
    fn test_declared_modules_not_duplicated() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            SourceFile::new("main.rs", "mod util;\nfn main() {}").entry(),
            SourceFile::new("util.rs", ""),
        ];
        write_project(dir.path(), &files, &project_spec(ProjectKind::Console, "x86_64-unknown-linux-gnu", &[])).unwrap();
        let main = fs::read_to_string(dir.path().join("src/main.rs")).unwrap();
        assert_eq!(main.matches("mod util;").count(), 1);
    }
}
