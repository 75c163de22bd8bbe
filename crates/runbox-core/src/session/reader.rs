//! Blocking line reader fed by asynchronous input submissions.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default time a read waits for input before yielding an empty line.
pub const DEFAULT_INPUT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Default)]
struct ReaderState {
    lines: VecDeque<String>,
    closed: bool,
}

/// Queue of input lines for an in-process run.
///
/// The guest side blocks in [`next_line`](Self::next_line); submissions
/// from the client [`push_line`](Self::push_line) and wake it. Lines are
/// delivered in submission order.
#[derive(Debug)]
pub struct InteractiveReader {
    state: Mutex<ReaderState>,
    available: Condvar,
    timeout: Duration,
}

impl Default for InteractiveReader {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_TIMEOUT)
    }
}

impl InteractiveReader {
    /// Create a reader whose reads give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(ReaderState::default()),
            available: Condvar::new(),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a line. Returns false once the reader is closed.
    pub fn push_line(&self, line: impl Into<String>) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.lines.push_back(line.into());
        drop(state);
        self.available.notify_one();
        true
    }

    /// Block until a line is available.
    ///
    /// Returns `Some("")` when the timeout elapses without input and `None`
    /// once the reader is closed and drained.
    pub fn next_line(&self) -> Option<String> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.lock();
        loop {
            if let Some(line) = state.lines.pop_front() {
                return Some(line);
            }
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!("Input wait timed out; supplying an empty line");
                return Some(String::new());
            }
            state = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Close the reader, waking every blocked read.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    /// Whether the reader has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
