//! Input routing to an isolated child process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::execute::ProcessTreeKiller;

/// A running child process that accepts input lines.
///
/// Lines go through a channel to a writer task that owns the child's
/// stdin, so submissions never block and keep their order.
#[derive(Debug)]
pub struct ChildProcessHandle {
    input: Mutex<Option<mpsc::UnboundedSender<String>>>,
    killer: ProcessTreeKiller,
    exited: AtomicBool,
}

impl ChildProcessHandle {
    /// Take over the stdin of `child` and start the writer task.
    ///
    /// # Errors
    /// Returns [`Error::StdinNotRedirected`] if the child's stdin was not
    /// piped, and [`Error::ProcessStart`] if it has no pid (already reaped).
    pub fn attach(child: &mut Child) -> Result<(Self, JoinHandle<()>)> {
        let stdin = child.stdin.take().ok_or(Error::StdinNotRedirected)?;
        let pid = child
            .id()
            .ok_or_else(|| Error::ProcessStart("child exited before registration".to_string()))?;

        let (input, lines) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_lines(stdin, lines));

        Ok((
            Self {
                input: Mutex::new(Some(input)),
                killer: ProcessTreeKiller::new(pid),
                exited: AtomicBool::new(false),
            },
            writer,
        ))
    }

    /// Queue a line for the child's stdin.
    ///
    /// Returns false if the child has exited or its stdin is gone.
    pub fn write_line(&self, line: impl Into<String>) -> bool {
        if self.has_exited() {
            return false;
        }
        match self.input.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(input) => input.send(line.into()).is_ok(),
            None => false,
        }
    }

    /// Close the child's stdin once queued lines are written.
    pub fn close_input(&self) {
        self.input.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Kill the child and all of its descendants.
    ///
    /// No-op once the child has been reaped, so a recycled pid is never hit.
    pub fn kill_tree(&self) {
        if !self.has_exited() {
            self.killer.kill_tree();
        }
    }

    /// Kill descendants left running by a child that exited on its own.
    pub fn kill_orphans(&self) {
        self.killer.kill_orphans();
    }

    /// Root process id.
    pub fn pid(&self) -> u32 {
        self.killer.pid()
    }

    /// Record that the child has exited.
    pub fn mark_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    /// Whether the child has exited.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

async fn write_lines(mut stdin: ChildStdin, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        if let Err(e) = stdin.write_all(&bytes).await {
            tracing::debug!("Child stdin closed: {}", e);
            break;
        }
        if let Err(e) = stdin.flush().await {
            tracing::debug!("Child stdin flush failed: {}", e);
            break;
        }
    }
}
