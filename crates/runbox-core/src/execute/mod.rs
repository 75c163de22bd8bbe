//! Runners for compiled guest programs.
//!
//! # Runners
//!
//! - **`InProcessRunner`** - Loads the library into the engine process. Fast, but
//!   serialized on the process-wide console and not interruptible.
//! - **`IsolatedRunner`** - Runs the library inside a `runbox-host` child process
//!   in a private sandbox directory. Cancellation kills the whole process tree.
//!
//! # Architecture
//!
//! ## In-Process Execution
//!
//! ```text
//! CompiledArtifact::InMemory
//!     │
//!     └── ModuleContext (temp dir + libloading::Library, one per run)
//!             │
//!             ├── ConsoleLock + StreamRedirect (fds 0/1/2 ⇄ pipes)
//!             │
//!             └── FFI call → runbox_entry
//! ```
//!
//! ## Process-Isolated Execution
//!
//! ```text
//! IsolatedRunner
//!     │
//!     ├── SandboxDir (run-<millis>-<hex>)
//!     │       └── CompiledArtifact::OnDisk + copied references
//!     │
//!     └── runbox-host --assembly <lib> --workingDirectory <dir> --requiresSta <bool>
//!             ├── stdout/stderr pumps → OutputSink
//!             ├── ChildProcessHandle (session input → stdin)
//!             └── ProcessTreeKiller on cancellation
//! ```

mod console;
mod context;
mod ffi;
mod in_process;
mod isolated;
mod module_context;
mod process_tree;

pub use console::{ConsoleLock, StreamRedirect};
pub use context::AbortHandle;
pub use ffi::{EntryFn, ExecutionResult, FreeFn, GuestOutcome, call_entry};
pub use in_process::InProcessRunner;
pub use isolated::{DEFAULT_MAX_CONCURRENT_PROCESSES, HOST_BINARY_NAME, IsolatedRunner, find_host_binary};
pub use module_context::ModuleContext;
pub use process_tree::ProcessTreeKiller;

use crate::error::Error;

/// How a run ended, as reported by a runner.
#[derive(Debug)]
pub enum RunStatus {
    /// The guest ran; exit code as a process would report it.
    Exited(i32),
    /// The run was cancelled.
    Cancelled,
    /// The guest could not be run, or faulted while running.
    Faulted(Error),
}
