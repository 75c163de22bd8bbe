//! Execution engine for runbox.
//!
//! Takes submitted Rust source plus requested packages, compiles it with
//! `rustc`, and runs it either inside this process or inside a separate
//! `runbox-host` process, streaming output back as it is produced.
//!
//! This crate provides:
//! - Execution-mode classification (console, desktop GUI, hosted web)
//! - Compilation to a loadable guest library, with rustc diagnostics
//! - In-process execution with redirected standard streams
//! - Process-isolated execution in a private sandbox directory
//! - Session-keyed interactive input and stop requests
//! - Publishing to a zipped, self-contained executable
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use runbox_core::{CollectingSink, EngineConfig, ExecutionEngine, ExecutionRequest};
//!
//! # async fn demo() -> runbox_core::Result<()> {
//! let engine = ExecutionEngine::new(EngineConfig::from_env())?;
//! let sink = Arc::new(CollectingSink::new());
//! let request = ExecutionRequest::single_file("main.rs", r#"fn main() { println!("hi"); }"#);
//! let outcome = engine.run(request, sink.clone()).await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod execute;
pub mod output;
pub mod paths;
pub mod publish;
pub mod request;
pub mod session;

pub use classify::{ExecutionMode, ExecutionModeDecision, HostPlatform, ProjectKind, classify};
pub use compile::{
    CompileOutcome, CompiledArtifact, CompilerConfig, Diagnostic, LibraryDirResolver, OutputKind,
    Reference, ReferenceResolver, RustcCompiler, Severity, StdOnlyResolver, ToolchainManager,
};
pub use config::EngineConfig;
pub use engine::{ExecutionEngine, RunOutcome};
pub use error::{Error, Result};
pub use execute::{AbortHandle, InProcessRunner, IsolatedRunner, ModuleContext, RunStatus};
pub use output::{CollectingSink, EventKind, OutputEvent, OutputSink};
pub use paths::SandboxDir;
pub use publish::{PublishPipeline, PublishResult};
pub use request::{ExecutionRequest, LanguageVersion, PackageRef, PublishRequest, SourceFile};
pub use session::{ChildProcessHandle, InteractiveReader, SessionRegistry, SessionTicket};
