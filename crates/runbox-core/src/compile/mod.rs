//! Compiler adapter.
//!
//! This module provides:
//! - Toolchain discovery (rustc, cargo, host triple)
//! - Entry point scanning and the exported FFI shim
//! - Guest compilation (source files → cdylib, in memory or on disk)
//! - Diagnostics (rustc JSON → location-tagged messages)
//! - Package reference resolution
//! - Cargo manifests for published programs
//!
//! # Architecture
//!
//! ```text
//! SourceFiles ──► entry scan + shim ──► rustc --crate-type=cdylib ──► CompiledArtifact
//!                                            │                           ├── InMemory (bytes)
//! PackageRefs ──► ReferenceResolver ─────────┘ (--extern)                └── OnDisk (binary + symbols)
//! ```

mod cargo_generator;
mod entry;
mod errors;
mod references;
mod rustc;
mod toolchain;
mod types;

pub use cargo_generator::{ManifestConfig, ReleaseProfile, generate_cargo_toml, sanitize_package_name};
pub use entry::{ENTRY_SYMBOL, EntryScan, EntryShape, FREE_SYMBOL, generate_shim, scan_entry_file};
pub use errors::{Diagnostic, Severity, SourceSpan, has_errors, parse_rustc_output};
pub use references::{LibraryDirResolver, Reference, ReferenceResolver, StdOnlyResolver};
pub use rustc::RustcCompiler;
pub use toolchain::ToolchainManager;
pub use types::{
    CompileOutcome, CompiledArtifact, CompilerConfig, GUEST_CRATE_NAME, OutputKind,
    dylib_extension, dylib_prefix, guest_library_name,
};
