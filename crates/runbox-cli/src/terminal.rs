//! Terminal streams that bypass in-process redirection.
//!
//! An in-process run points the process's standard streams at pipes while
//! the guest executes. The CLI duplicates the original descriptors at
//! startup and does all of its own reading and writing through the copies,
//! so its output never loops back into the guest's captured streams.

use std::fs::File;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use runbox_core::{EventKind, OutputEvent, OutputSink};

use crate::colors;

/// Duplicates of the original stdin, stdout and stderr.
pub struct Terminal {
    pub stdin: File,
    pub stdout: File,
    pub stderr: File,
}

impl Terminal {
    /// Duplicate the current standard streams.
    #[cfg(unix)]
    pub fn detach() -> io::Result<Self> {
        use std::os::fd::AsFd;

        Ok(Self {
            stdin: File::from(io::stdin().as_fd().try_clone_to_owned()?),
            stdout: File::from(io::stdout().as_fd().try_clone_to_owned()?),
            stderr: File::from(io::stderr().as_fd().try_clone_to_owned()?),
        })
    }

    /// Duplicate the current standard streams.
    #[cfg(windows)]
    pub fn detach() -> io::Result<Self> {
        use std::os::windows::io::AsHandle;

        Ok(Self {
            stdin: File::from(io::stdin().as_handle().try_clone_to_owned()?),
            stdout: File::from(io::stdout().as_handle().try_clone_to_owned()?),
            stderr: File::from(io::stderr().as_handle().try_clone_to_owned()?),
        })
    }

    /// Writer for the tracing subscriber.
    pub fn log_writer(&self) -> io::Result<Mutex<File>> {
        Ok(Mutex::new(self.stderr.try_clone()?))
    }

    /// Sink printing run events to the terminal.
    pub fn sink(&self) -> io::Result<TerminalSink> {
        Ok(TerminalSink {
            stdout: Mutex::new(self.stdout.try_clone()?),
            stderr: Mutex::new(self.stderr.try_clone()?),
        })
    }
}

/// Prints program output to stdout, and errors and the completion line to
/// stderr.
pub struct TerminalSink {
    stdout: Mutex<File>,
    stderr: Mutex<File>,
}

impl TerminalSink {
    fn write(stream: &Mutex<File>, text: &str) {
        let mut file = stream.lock().unwrap_or_else(PoisonError::into_inner);
        // A closed terminal is not worth failing the run over.
        let _ = file.write_all(text.as_bytes());
        let _ = file.flush();
    }
}

impl OutputSink for TerminalSink {
    fn emit(&self, event: OutputEvent) {
        match event.kind {
            EventKind::Output => Self::write(&self.stdout, &event.content),
            EventKind::Error => Self::write(&self.stderr, &event.content),
            EventKind::Completed => Self::write(
                &self.stderr,
                &format!("{}[{}]{}\n", colors::DIM, event.content, colors::RESET),
            ),
        }
    }
}
