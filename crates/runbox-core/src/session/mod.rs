//! Session & interactive I/O management.
//!
//! A session id correlates a live run with input submissions and stop
//! requests that arrive while it runs:
//!
//! ```text
//! provide_input(id, text) ──► SessionRegistry ──┬── InteractiveReader ──► guest stdin (in-process)
//!                                               └── ChildProcessHandle ──► child stdin (isolated)
//! stop(id) ──────────────────► SessionRegistry ──► abort + close reader / kill process tree
//! ```

mod child;
mod reader;
mod registry;

pub use child::ChildProcessHandle;
pub use reader::{DEFAULT_INPUT_TIMEOUT, InteractiveReader};
pub use registry::{SessionRegistry, SessionTicket};
