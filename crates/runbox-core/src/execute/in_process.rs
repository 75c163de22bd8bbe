//! In-process runner.
//!
//! Runs a guest library inside the engine's own process:
//!
//! ```text
//! Loaded ──► Streams-Redirected ──► Invoking ──► Completed | Faulted | Cancelled ──► Unloaded
//! ```
//!
//! Only one in-process run holds the console at a time. The guest call
//! itself cannot be interrupted; cancellation is checked before invoking
//! and again when reporting.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::output::OutputSink;
use crate::session::{DEFAULT_INPUT_TIMEOUT, InteractiveReader, SessionRegistry, SessionTicket};

use super::AbortHandle;
use super::RunStatus;
use super::console::{ConsoleLock, StreamRedirect};
use super::ffi::GuestOutcome;
use super::module_context::ModuleContext;

/// Executes compiled libraries in the current process.
pub struct InProcessRunner {
    sessions: Arc<SessionRegistry>,
    input_timeout: Duration,
}

impl InProcessRunner {
    /// Create a runner routing session input through `sessions`.
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            sessions,
            input_timeout: DEFAULT_INPUT_TIMEOUT,
        }
    }

    /// Set how long an input read waits before yielding an empty line.
    pub fn with_input_timeout(mut self, timeout: Duration) -> Self {
        self.input_timeout = timeout;
        self
    }

    /// Run library `bytes`. Blocks until the guest returns.
    ///
    /// Guest stdout and stderr go to `sink` as they are written. With a
    /// `ticket`, stdin reads are served from the session's input.
    pub fn run(
        &self,
        bytes: &[u8],
        ticket: Option<&SessionTicket>,
        abort: &AbortHandle,
        sink: Arc<dyn OutputSink>,
    ) -> RunStatus {
        if abort.is_aborted() {
            return RunStatus::Cancelled;
        }

        let context = match ModuleContext::from_bytes(bytes) {
            Ok(context) => context,
            Err(e) => return RunStatus::Faulted(e),
        };

        let console = ConsoleLock::acquire();
        tracing::debug!("Console acquired for {}", context.path().display());

        let reader = ticket.map(|ticket| {
            let reader = Arc::new(InteractiveReader::new(self.input_timeout));
            self.sessions.attach_interactive(ticket, reader.clone());
            reader
        });

        let redirect = match StreamRedirect::install(&console, sink.clone(), reader.clone()) {
            Ok(redirect) => redirect,
            Err(e) => {
                if let Some(reader) = &reader {
                    reader.close();
                }
                return RunStatus::Faulted(e);
            }
        };

        // Checked again now that the console wait is over.
        let result = if abort.is_aborted() {
            Err(Error::Aborted)
        } else {
            context.run()
        };

        redirect.restore();
        drop(console);
        drop(context);

        match result {
            Err(Error::Aborted) => RunStatus::Cancelled,
            Err(e) => RunStatus::Faulted(e),
            Ok(_) if abort.is_aborted() => RunStatus::Cancelled,
            Ok(GuestOutcome::Panicked(message)) => RunStatus::Faulted(Error::Execution(message)),
            Ok(outcome) => {
                // `main` returned `Err`: report it the way the Rust runtime does.
                if let GuestOutcome::Failed(message) = &outcome {
                    sink.error(&format!("{}\n", message));
                }
                RunStatus::Exited(outcome.exit_code())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CollectingSink;

    #[test]
    fn test_aborted_before_load_is_cancelled() {
        let runner = InProcessRunner::new(Arc::new(SessionRegistry::new()));
        let abort = AbortHandle::new();
        abort.abort();
        let status = runner.run(b"", None, &abort, Arc::new(CollectingSink::new()));
        assert!(matches!(status, RunStatus::Cancelled));
    }

    #[test]
    fn test_unloadable_bytes_fault() {
        let runner = InProcessRunner::new(Arc::new(SessionRegistry::new()));
        let status = runner.run(
            b"not a library",
            None,
            &AbortHandle::new(),
            Arc::new(CollectingSink::new()),
        );
        assert!(matches!(status, RunStatus::Faulted(Error::LibraryLoad(_))));
    }
}
