//! Error types for runbox-core.

use thiserror::Error;

/// Result type for runbox-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in runbox-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Compilation failed.
    #[error("compilation failed: {message}")]
    Compilation { message: String },

    /// Toolchain error (rustc or cargo missing, unusable output).
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// A requested package could not be resolved to a local library.
    #[error("package not found: {id}@{version}")]
    PackageNotFound { id: String, version: String },

    /// The request asked for something the engine cannot do.
    #[error("unsupported request: {0}")]
    UnsupportedMode(String),

    /// The current host cannot perform the requested operation.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The execution host binary could not be located.
    #[error("execution host not found: {0}")]
    HostNotFound(String),

    /// The execution host process failed to start.
    #[error("failed to start process: {0}")]
    ProcessStart(String),

    /// A child process was spawned without a redirected stdin.
    #[error("process stdin is not redirected")]
    StdinNotRedirected,

    /// The compiled program does not expose an entry point.
    #[error("No entry point found. Define `fn main()` in the entry file.")]
    EntryPointMissing,

    /// Failed to load dynamic library.
    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// Guest program fault.
    #[error("execution error: {0}")]
    Execution(String),

    /// Execution was cancelled.
    #[error("execution cancelled")]
    Aborted,

    /// Publish pipeline failure.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Archive creation failure.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error represents a cancelled run rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
