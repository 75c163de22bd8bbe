//! Session registry: session id → live input target.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use crate::execute::AbortHandle;

use super::child::ChildProcessHandle;
use super::reader::InteractiveReader;

/// What a session currently routes input to.
#[derive(Debug, Clone)]
enum SessionTarget {
    /// Run registered, runner not yet attached (compiling).
    Pending,
    /// In-process run reading from a queue.
    Interactive(Arc<InteractiveReader>),
    /// Isolated run with a child process.
    Child(Arc<ChildProcessHandle>),
}

#[derive(Debug)]
struct SessionEntry {
    generation: u64,
    abort: AbortHandle,
    target: SessionTarget,
}

/// Proof of registration returned by [`SessionRegistry::begin`].
///
/// Attach and finish calls only act on the entry the ticket created, so an
/// older run finishing late cannot touch a newer run that reused its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    id: String,
    generation: u64,
}

impl SessionTicket {
    /// The session id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Registry of live sessions.
///
/// Safe for concurrent use by runners, input submissions, and stop
/// requests. At most one entry exists per id; registering an id again
/// replaces the earlier entry (latest wins).
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<FxHashMap<String, SessionEntry>>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a run under `id`, replacing any earlier registration.
    pub fn begin(&self, id: &str, abort: AbortHandle) -> SessionTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.lock().insert(
            id.to_string(),
            SessionEntry {
                generation,
                abort,
                target: SessionTarget::Pending,
            },
        );
        if previous.is_some() {
            tracing::info!("Session {} re-registered; earlier run no longer receives input", id);
        }
        SessionTicket {
            id: id.to_string(),
            generation,
        }
    }

    /// Route the session's input to an in-process reader.
    ///
    /// Returns false (and closes the reader) if the ticket is stale.
    pub fn attach_interactive(&self, ticket: &SessionTicket, reader: Arc<InteractiveReader>) -> bool {
        let attached = self.attach(ticket, SessionTarget::Interactive(reader.clone()));
        if !attached {
            reader.close();
        }
        attached
    }

    /// Route the session's input to a child process.
    ///
    /// Returns false if the ticket is stale; the caller still owns the child.
    pub fn attach_child(&self, ticket: &SessionTicket, child: Arc<ChildProcessHandle>) -> bool {
        self.attach(ticket, SessionTarget::Child(child))
    }

    fn attach(&self, ticket: &SessionTicket, target: SessionTarget) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(&ticket.id) {
            Some(entry) if entry.generation == ticket.generation => {
                entry.target = target;
                true
            }
            _ => false,
        }
    }

    /// Remove the ticket's entry, leaving newer registrations alone.
    pub fn finish(&self, ticket: &SessionTicket) {
        let mut sessions = self.lock();
        if sessions
            .get(&ticket.id)
            .is_some_and(|entry| entry.generation == ticket.generation)
        {
            sessions.remove(&ticket.id);
        }
    }

    /// Deliver a line of input to the session.
    ///
    /// Returns false for unknown ids, runs still compiling, and targets that
    /// have exited or closed.
    pub fn provide_input(&self, id: &str, text: &str) -> bool {
        let target = match self.lock().get(id) {
            Some(entry) => entry.target.clone(),
            None => return false,
        };

        match target {
            SessionTarget::Pending => false,
            SessionTarget::Interactive(reader) => reader.push_line(text),
            SessionTarget::Child(child) => child.write_line(text),
        }
    }

    /// Signal end of input: reads drain what is queued, then see EOF.
    ///
    /// Returns false for unknown ids and runs still compiling.
    pub fn close_input(&self, id: &str) -> bool {
        let target = match self.lock().get(id) {
            Some(entry) => entry.target.clone(),
            None => return false,
        };

        match target {
            SessionTarget::Pending => false,
            SessionTarget::Interactive(reader) => {
                reader.close();
                true
            }
            SessionTarget::Child(child) => {
                child.close_input();
                true
            }
        }
    }

    /// Stop the session's run.
    ///
    /// Removes the entry, trips the run's abort handle, closes a reader, and
    /// kills a child process tree. Returns true the first time, false when
    /// there is nothing to stop.
    pub fn stop(&self, id: &str) -> bool {
        let Some(entry) = self.lock().remove(id) else {
            return false;
        };

        tracing::info!("Stopping session {}", id);
        entry.abort.abort();
        match entry.target {
            SessionTarget::Pending => {}
            SessionTarget::Interactive(reader) => reader.close(),
            SessionTarget::Child(child) => child.kill_tree(),
        }
        true
    }

    /// Whether a session id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
