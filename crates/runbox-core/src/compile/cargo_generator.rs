//! Cargo manifest generation for published programs.

use crate::request::PackageRef;

/// Options for the release profile in Cargo.toml.
#[derive(Debug, Clone)]
pub struct ReleaseProfile {
    /// Optimization level (0-3).
    pub opt_level: u8,
    /// Enable Link-Time Optimization.
    pub lto: bool,
    /// Number of codegen units.
    pub codegen_units: u32,
    /// Panic strategy ("unwind" or "abort").
    pub panic: &'static str,
    /// Strip symbols from the binary.
    pub strip: bool,
}

impl Default for ReleaseProfile {
    fn default() -> Self {
        Self {
            opt_level: 3,
            lto: false,
            codegen_units: 16,
            panic: "unwind",
            strip: false,
        }
    }
}

impl ReleaseProfile {
    /// Profile for self-contained downloadable binaries.
    pub fn production() -> Self {
        Self {
            opt_level: 3,
            lto: true,
            codegen_units: 1,
            panic: "abort",
            strip: true,
        }
    }
}

/// Configuration for generating a Cargo manifest.
#[derive(Debug, Clone)]
pub struct ManifestConfig<'a> {
    /// Package name.
    pub name: &'a str,
    /// Package version.
    pub version: &'a str,
    /// Rust edition.
    pub edition: &'a str,
    /// Binary name, when it differs from the package name.
    pub bin_name: Option<&'a str>,
    /// Release profile settings.
    pub release_profile: Option<ReleaseProfile>,
    /// Whether to add an empty [workspace] table.
    pub standalone_workspace: bool,
}

impl<'a> Default for ManifestConfig<'a> {
    fn default() -> Self {
        Self {
            name: "generated",
            version: "0.1.0",
            edition: "2021",
            bin_name: None,
            release_profile: None,
            standalone_workspace: false,
        }
    }
}

/// Generate a Cargo.toml manifest.
pub fn generate_cargo_toml(config: &ManifestConfig<'_>, dependencies: &[PackageRef]) -> String {
    let mut toml = String::new();

    // Package section
    toml.push_str("[package]\n");
    toml.push_str(&format!("name = \"{}\"\n", config.name));
    toml.push_str(&format!("version = \"{}\"\n", config.version));
    toml.push_str(&format!("edition = \"{}\"\n", config.edition));
    toml.push('\n');

    if let Some(bin_name) = config.bin_name {
        toml.push_str("[[bin]]\n");
        toml.push_str(&format!("name = \"{}\"\n", bin_name));
        toml.push_str("path = \"src/main.rs\"\n");
        toml.push('\n');
    }

    // Release profile (if applicable)
    if let Some(profile) = &config.release_profile {
        toml.push_str("[profile.release]\n");
        toml.push_str(&format!("opt-level = {}\n", profile.opt_level));
        if profile.lto {
            toml.push_str("lto = true\n");
        }
        toml.push_str(&format!("codegen-units = {}\n", profile.codegen_units));
        toml.push_str(&format!("panic = \"{}\"\n", profile.panic));
        if profile.strip {
            toml.push_str("strip = true\n");
        }
        toml.push('\n');
    }

    // Dependencies section
    toml.push_str("[dependencies]\n");
    for dep in dependencies {
        let version = if dep.version.trim().is_empty() {
            "*"
        } else {
            dep.version.trim()
        };
        toml.push_str(&format!("{} = \"{}\"\n", dep.id, version));
    }

    // Standalone workspace table (prevents being part of parent workspace)
    if config.standalone_workspace {
        toml.push('\n');
        toml.push_str("[workspace]\n");
    }

    toml
}

/// Turn an arbitrary output name into a valid cargo package name.
pub fn sanitize_package_name(name: &str) -> String {
    let mut sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        sanitized.push_str("app");
    }
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}
