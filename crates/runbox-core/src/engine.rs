//! Execution engine façade.
//!
//! Glues the pieces together for one run:
//!
//! ```text
//! ExecutionRequest
//!     │
//!     ├── classify (project type + source scan) ──► ExecutionModeDecision
//!     ├── ReferenceResolver (packages → rlibs)
//!     ├── RustcCompiler
//!     │       ├── InMemory  ──► InProcessRunner
//!     │       └── OnDisk    ──► IsolatedRunner (sandbox)
//!     └── exactly one `completed` event
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::classify::{ExecutionMode, ExecutionModeDecision, HostPlatform, classify};
use crate::compile::{
    CompiledArtifact, Diagnostic, LibraryDirResolver, OutputKind, Reference, ReferenceResolver,
    RustcCompiler, StdOnlyResolver, ToolchainManager,
};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::execute::{InProcessRunner, IsolatedRunner, RunStatus};
use crate::output::{OutputEvent, OutputSink};
use crate::publish::{PublishPipeline, PublishResult};
use crate::request::{ExecutionRequest, LanguageVersion, PublishRequest, SourceFile, normalize_files};
use crate::session::{SessionRegistry, SessionTicket};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The program ran to completion with this exit code.
    Finished { exit_code: i32 },
    /// Compilation reported errors; nothing was executed.
    CompileFailed,
    /// The run was cancelled.
    Cancelled,
    /// The run could not start or faulted.
    Failed(String),
}

impl RunOutcome {
    /// Content of the terminal `completed` event.
    pub fn completion_message(&self) -> String {
        match self {
            Self::Finished { exit_code: 0 } => "Execution completed".to_string(),
            Self::Finished { exit_code } => format!("Process exited with code {}", exit_code),
            Self::CompileFailed => "Compilation error".to_string(),
            Self::Cancelled => "Execution cancelled".to_string(),
            Self::Failed(_) => "Execution failed".to_string(),
        }
    }
}

/// Compiles and runs guest programs, and publishes them.
pub struct ExecutionEngine {
    config: EngineConfig,
    host: HostPlatform,
    sessions: Arc<SessionRegistry>,
    resolver: Arc<dyn ReferenceResolver>,
    compiler: Arc<RustcCompiler>,
    in_process: Arc<InProcessRunner>,
    isolated: IsolatedRunner,
    publisher: PublishPipeline,
}

impl ExecutionEngine {
    /// Create an engine, detecting the toolchain and the host platform.
    ///
    /// # Errors
    /// Returns an error if `rustc` cannot be found.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let toolchain = ToolchainManager::new()?;
        tracing::info!("Execution engine using {}", toolchain.version());

        let sessions = Arc::new(SessionRegistry::new());
        let resolver: Arc<dyn ReferenceResolver> = match &config.library_dir {
            Some(dir) => Arc::new(LibraryDirResolver::new(dir)),
            None => Arc::new(StdOnlyResolver),
        };
        let in_process = InProcessRunner::new(sessions.clone()).with_input_timeout(config.input_timeout);
        let isolated = IsolatedRunner::new(sessions.clone(), &config.temp_root)
            .with_host_path(config.host_path.clone())
            .with_max_processes(config.max_concurrent_processes);
        let publisher = PublishPipeline::new(toolchain.clone(), &config.temp_root);
        let compiler = RustcCompiler::new(config.compiler.clone(), toolchain);

        Ok(Self {
            host: HostPlatform::detect(),
            sessions,
            resolver,
            compiler: Arc::new(compiler),
            in_process: Arc::new(in_process),
            isolated,
            publisher,
            config,
        })
    }

    /// Use a different package resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Override the detected host platform.
    pub fn with_host_platform(mut self, host: HostPlatform) -> Self {
        self.host = host;
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Live sessions.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Compile and run `request`, streaming events to `sink`.
    ///
    /// Never fails and never panics: every problem becomes an `error` event,
    /// and exactly one `completed` event ends the stream.
    pub async fn run(&self, request: ExecutionRequest, sink: Arc<dyn OutputSink>) -> RunOutcome {
        let ticket = request
            .session_id
            .as_deref()
            .map(|id| self.sessions.begin(id, request.abort.clone()));

        let outcome = match AssertUnwindSafe(self.run_inner(&request, ticket.as_ref(), &sink))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Run panicked: {}", message);
                sink.error(&format!("Internal error: {}\n", message));
                RunOutcome::Failed(message)
            }
        };

        if let Some(ticket) = &ticket {
            self.sessions.finish(ticket);
        }

        tracing::info!("Run finished: {:?}", outcome);
        sink.emit(OutputEvent::completed(outcome.completion_message()));
        outcome
    }

    async fn run_inner(
        &self,
        request: &ExecutionRequest,
        ticket: Option<&SessionTicket>,
        sink: &Arc<dyn OutputSink>,
    ) -> RunOutcome {
        let abort = &request.abort;
        let prepared = self.prepare(request);
        let (files, version, decision, references) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return fail(sink, e),
        };
        if abort.is_aborted() {
            return RunOutcome::Cancelled;
        }

        tracing::info!(
            "Running {} program ({} file(s), {:?})",
            decision.kind.as_str(),
            files.len(),
            decision.mode
        );

        match decision.mode {
            ExecutionMode::InProcess => {
                let compiled = self
                    .compile(files, references, version, OutputKind::InMemory)
                    .await;
                let bytes = match compiled {
                    Ok(Ok(CompiledArtifact::InMemory { bytes })) => bytes,
                    Ok(Ok(CompiledArtifact::OnDisk { binary, .. })) => match std::fs::read(&binary) {
                        Ok(bytes) => bytes,
                        Err(e) => return fail(sink, e.into()),
                    },
                    Ok(Err(errors)) => return compile_failed(sink, &errors),
                    Err(e) => return fail(sink, e),
                };
                if abort.is_aborted() {
                    return RunOutcome::Cancelled;
                }

                let runner = self.in_process.clone();
                let ticket = ticket.cloned();
                let abort = abort.clone();
                let guest_sink = sink.clone();
                let status = tokio::task::spawn_blocking(move || {
                    runner.run(&bytes, ticket.as_ref(), &abort, guest_sink)
                })
                .await
                .unwrap_or_else(|e| RunStatus::Faulted(Error::Execution(join_message(e))));
                finish(sink, status)
            }
            ExecutionMode::IsolatedProcess => {
                let sandbox = match self.isolated.prepare_sandbox() {
                    Ok(sandbox) => sandbox,
                    Err(e) => return fail(sink, e),
                };
                let output = OutputKind::OnDisk {
                    dir: sandbox.path().to_path_buf(),
                };
                let compiled = self.compile(files, references.clone(), version, output).await;
                let binary = match compiled {
                    Ok(Ok(artifact)) => match artifact.binary_path() {
                        Some(binary) => binary.to_path_buf(),
                        None => {
                            return fail(sink, Error::Compilation {
                                message: "compiler produced no on-disk binary".to_string(),
                            });
                        }
                    },
                    Ok(Err(errors)) => return compile_failed(sink, &errors),
                    Err(e) => return fail(sink, e),
                };
                if abort.is_aborted() {
                    return RunOutcome::Cancelled;
                }

                let status = self
                    .isolated
                    .run(sandbox, &binary, &references, decision, ticket, abort, sink.clone())
                    .await;
                finish(sink, status)
            }
        }
    }

    /// Everything decided before compiling: files, edition, mode, references.
    fn prepare(
        &self,
        request: &ExecutionRequest,
    ) -> Result<(Vec<SourceFile>, LanguageVersion, ExecutionModeDecision, Vec<Reference>)> {
        let files = normalize_files(request.files.clone());
        let version = LanguageVersion::parse_selector(request.language_version.as_deref())?;
        let source = files
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let decision = classify(&request.project_type, &source, self.host)?;
        let references = self.resolver.resolve_all(&request.packages)?;
        Ok((files, version, decision, references))
    }

    /// Compile off the async runtime.
    ///
    /// The inner `Err` holds the error-severity diagnostics of a failed build.
    async fn compile(
        &self,
        files: Vec<SourceFile>,
        references: Vec<Reference>,
        version: LanguageVersion,
        output: OutputKind,
    ) -> Result<std::result::Result<CompiledArtifact, Vec<Diagnostic>>> {
        let compiler = self.compiler.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            compiler.compile(&files, &references, version, &output)
        })
        .await
        .map_err(|e| Error::Compilation {
            message: join_message(e),
        })??;

        for warning in outcome.diagnostics.iter().filter(|d| !d.is_error()) {
            tracing::debug!("{}", warning.location_tagged());
        }

        let success = outcome.is_success();
        match outcome.artifact {
            Some(artifact) if success => Ok(Ok(artifact)),
            _ => {
                let mut errors: Vec<Diagnostic> =
                    outcome.diagnostics.into_iter().filter(Diagnostic::is_error).collect();
                if errors.is_empty() {
                    errors.push(Diagnostic::simple("compiler produced no output"));
                }
                Ok(Err(errors))
            }
        }
    }

    /// Deliver a line of input to a running session.
    pub fn provide_input(&self, session_id: &str, text: &str) -> bool {
        self.sessions.provide_input(session_id, text)
    }

    /// Signal end of input for a session.
    pub fn close_input(&self, session_id: &str) -> bool {
        self.sessions.close_input(session_id)
    }

    /// Stop a running session. False means there was nothing to stop.
    pub fn stop(&self, session_id: &str) -> bool {
        self.sessions.stop(session_id)
    }

    /// Build a downloadable artifact, streaming build output to `sink`.
    pub async fn publish(&self, request: PublishRequest, sink: Arc<dyn OutputSink>) -> PublishResult {
        self.publisher.publish(request, sink).await
    }
}

/// Report each error as `file:line: message`; nothing is executed.
fn compile_failed(sink: &Arc<dyn OutputSink>, errors: &[Diagnostic]) -> RunOutcome {
    for diagnostic in errors {
        sink.error(&format!("{}\n", diagnostic.location_tagged()));
    }
    RunOutcome::CompileFailed
}

fn fail(sink: &Arc<dyn OutputSink>, error: Error) -> RunOutcome {
    if error.is_cancelled() {
        return RunOutcome::Cancelled;
    }
    let message = error.to_string();
    tracing::warn!("Run failed: {}", message);
    sink.error(&format!("{}\n", message));
    RunOutcome::Failed(message)
}

fn finish(sink: &Arc<dyn OutputSink>, status: RunStatus) -> RunOutcome {
    match status {
        RunStatus::Exited(exit_code) => RunOutcome::Finished { exit_code },
        RunStatus::Cancelled => RunOutcome::Cancelled,
        RunStatus::Faulted(Error::Execution(message)) => {
            sink.error(&format!("Execution error: {}\n", message));
            RunOutcome::Failed(message)
        }
        RunStatus::Faulted(e) => fail(sink, e),
    }
}

fn join_message(error: tokio::task::JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic().as_ref())
    } else {
        error.to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
