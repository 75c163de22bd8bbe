//! Process-wide console ownership and standard stream redirection.
//!
//! Standard streams are process globals. An in-process run takes the
//! [`ConsoleLock`], then swaps fds 0/1/2 for pipes: writes on 1 and 2 are
//! pumped to the run's sink, and lines from its interactive reader are fed
//! into 0. Restoring puts the saved descriptors back and joins the pumps,
//! so every byte the guest wrote is delivered before the run completes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::output::OutputSink;
use crate::session::InteractiveReader;

static CONSOLE: Mutex<()> = Mutex::new(());

/// Exclusive ownership of the process's standard streams.
pub struct ConsoleLock {
    _guard: MutexGuard<'static, ()>,
}

impl ConsoleLock {
    /// Block until no other run holds the console.
    pub fn acquire() -> Self {
        let guard = CONSOLE.lock().unwrap_or_else(PoisonError::into_inner);
        Self { _guard: guard }
    }
}

/// Which guest stream a pump forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

#[cfg(unix)]
pub use unix::StreamRedirect;

#[cfg(not(unix))]
pub use fallback::StreamRedirect;

#[cfg(unix)]
mod unix {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::fd::{FromRawFd, RawFd};
    use std::thread::JoinHandle;

    use super::*;
    use crate::output::Utf8ChunkDecoder;

    const CHUNK_SIZE: usize = 1024;

    fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    fn pipe() -> io::Result<(RawFd, RawFd)> {
        let mut fds = [0 as RawFd; 2];
        cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        for fd in fds {
            unsafe {
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        Ok((fds[0], fds[1]))
    }

    fn close(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    /// Point `target` at `source`'s file, then close `source`.
    fn replace_fd(source: RawFd, target: RawFd) -> io::Result<()> {
        let result = cvt(unsafe { libc::dup2(source, target) }).map(|_| ());
        close(source);
        result
    }

    fn flush_std() {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }

    /// Active redirection of fds 0, 1 and 2.
    ///
    /// Dropping without [`restore`](Self::restore) restores as well.
    pub struct StreamRedirect {
        saved: [RawFd; 3],
        pumps: Vec<JoinHandle<()>>,
        feeder: Option<JoinHandle<()>>,
        reader: Option<Arc<InteractiveReader>>,
        active: bool,
    }

    impl StreamRedirect {
        /// Redirect the standard streams. The caller must hold the
        /// [`ConsoleLock`] for as long as the redirect is active.
        ///
        /// Without a reader, stdin reads hit end-of-file immediately.
        pub fn install(
            _console: &ConsoleLock,
            sink: Arc<dyn OutputSink>,
            reader: Option<Arc<InteractiveReader>>,
        ) -> Result<Self> {
            flush_std();

            let mut saved = [-1 as RawFd; 3];
            for (slot, fd) in saved.iter_mut().zip([0, 1, 2]) {
                match cvt(unsafe { libc::dup(fd) }) {
                    Ok(copy) => *slot = copy,
                    Err(e) => {
                        saved.iter().filter(|fd| **fd >= 0).for_each(|fd| close(*fd));
                        return Err(e.into());
                    }
                }
            }

            let mut redirect = Self {
                saved,
                pumps: Vec::with_capacity(2),
                feeder: None,
                reader: reader.clone(),
                active: true,
            };

            // From here on a failure restores through Drop.
            for (fd, kind) in [(1, StreamKind::Stdout), (2, StreamKind::Stderr)] {
                let (read_end, write_end) = pipe()?;
                if let Err(e) = replace_fd(write_end, fd) {
                    close(read_end);
                    return Err(e.into());
                }
                let file = unsafe { File::from_raw_fd(read_end) };
                let sink = sink.clone();
                redirect
                    .pumps
                    .push(std::thread::spawn(move || pump(file, kind, sink.as_ref())));
            }

            let (read_end, write_end) = pipe()?;
            if let Err(e) = replace_fd(read_end, 0) {
                close(write_end);
                return Err(e.into());
            }
            match reader {
                Some(reader) => {
                    let file = unsafe { File::from_raw_fd(write_end) };
                    redirect.feeder = Some(std::thread::spawn(move || feed(file, &reader)));
                }
                None => close(write_end),
            }

            Ok(redirect)
        }

        /// Put the original streams back and wait for all output to drain.
        pub fn restore(mut self) {
            self.restore_inner();
        }

        fn restore_inner(&mut self) {
            if !self.active {
                return;
            }
            self.active = false;

            flush_std();

            // Output pipes see EOF once fds 1 and 2 stop pointing at them.
            for (fd, saved) in [(1, self.saved[1]), (2, self.saved[2])] {
                if let Err(e) = cvt(unsafe { libc::dup2(saved, fd) }) {
                    tracing::warn!("Failed to restore fd {}: {}", fd, e);
                }
            }
            for pump in self.pumps.drain(..) {
                let _ = pump.join();
            }

            if let Some(reader) = self.reader.take() {
                reader.close();
            }
            // Dropping the last read end fails a feeder blocked on a full
            // pipe with EPIPE, so the join below cannot hang.
            if let Err(e) = cvt(unsafe { libc::dup2(self.saved[0], 0) }) {
                tracing::warn!("Failed to restore fd 0: {}", e);
            }
            if let Some(feeder) = self.feeder.take() {
                let _ = feeder.join();
            }

            for fd in self.saved {
                close(fd);
            }
        }
    }

    impl Drop for StreamRedirect {
        fn drop(&mut self) {
            self.restore_inner();
        }
    }

    fn pump(mut file: File, kind: StreamKind, sink: &dyn OutputSink) {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut decoder = Utf8ChunkDecoder::new();
        let forward = |text: String| {
            if text.is_empty() {
                return;
            }
            match kind {
                StreamKind::Stdout => sink.output(&text),
                StreamKind::Stderr => sink.error(&text),
            }
        };

        loop {
            match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => forward(decoder.decode(&buf[..n])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        forward(decoder.finish());
    }

    fn feed(mut file: File, reader: &InteractiveReader) {
        while let Some(line) = reader.next_line() {
            let mut bytes = line.into_bytes();
            bytes.push(b'\n');
            if file.write_all(&bytes).and_then(|_| file.flush()).is_err() {
                break;
            }
        }
    }
}

#[cfg(not(unix))]
mod fallback {
    use super::*;
    use crate::error::Error;

    /// Stream redirection is only available on unix hosts.
    pub struct StreamRedirect;

    impl StreamRedirect {
        pub fn install(
            _console: &ConsoleLock,
            _sink: Arc<dyn OutputSink>,
            _reader: Option<Arc<InteractiveReader>>,
        ) -> Result<Self> {
            Err(Error::UnsupportedPlatform(
                "in-process execution requires a unix host; use an isolated project type".to_string(),
            ))
        }

        pub fn restore(self) {}
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::output::{CollectingSink, EventKind};
    use std::time::Duration;

    fn fd_identity(fd: i32) -> (u64, u64) {
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::fstat(fd, &mut stat) }, 0);
        (stat.st_dev as u64, stat.st_ino as u64)
    }

    fn write_fd(fd: i32, bytes: &[u8]) {
        let written = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        assert_eq!(written, bytes.len() as isize);
    }

    #[test]
    fn test_redirect_captures_and_restores() {
        let console = ConsoleLock::acquire();
        let before = [fd_identity(0), fd_identity(1), fd_identity(2)];

        let sink = Arc::new(CollectingSink::new());
        let redirect = StreamRedirect::install(&console, sink.clone(), None).unwrap();
        write_fd(1, "héllo world\n".as_bytes());
        write_fd(2, b"oops\n");
        redirect.restore();

        let after = [fd_identity(0), fd_identity(1), fd_identity(2)];
        assert_eq!(before, after);
        // The test harness may print into the pipes while they are installed.
        assert!(sink.text(EventKind::Output).contains("héllo world\n"));
        assert!(sink.text(EventKind::Error).contains("oops\n"));
    }

    #[test]
    fn test_stdin_fed_from_reader() {
        let console = ConsoleLock::acquire();
        let sink = Arc::new(CollectingSink::new());
        let reader = Arc::new(InteractiveReader::new(Duration::from_secs(5)));
        reader.push_line("typed");

        let redirect = StreamRedirect::install(&console, sink, Some(reader.clone())).unwrap();
        let mut buf = [0u8; 16];
        let n = unsafe { libc::read(0, buf.as_mut_ptr().cast(), buf.len()) };
        redirect.restore();

        assert_eq!(&buf[..n as usize], b"typed\n");
        assert!(reader.is_closed());
    }

    #[test]
    fn test_restore_with_unread_input_beyond_pipe_capacity() {
        let console = ConsoleLock::acquire();
        let sink = Arc::new(CollectingSink::new());
        let reader = Arc::new(InteractiveReader::new(Duration::from_secs(5)));
        let line = "x".repeat(1024);
        for _ in 0..200 {
            reader.push_line(line.as_str());
        }

        let redirect = StreamRedirect::install(&console, sink, Some(reader.clone())).unwrap();
        // Let the feeder fill the pipe and block.
        std::thread::sleep(Duration::from_millis(100));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            redirect.restore();
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
            "restore blocked on unread input"
        );
        assert!(reader.is_closed());
    }

    #[test]
    fn test_stdin_without_reader_is_eof() {
        let console = ConsoleLock::acquire();
        let sink = Arc::new(CollectingSink::new());
        let redirect = StreamRedirect::install(&console, sink, None).unwrap();
        let mut buf = [0u8; 4];
        let n = unsafe { libc::read(0, buf.as_mut_ptr().cast(), buf.len()) };
        redirect.restore();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_drop_restores() {
        let console = ConsoleLock::acquire();
        let before = fd_identity(1);
        {
            let sink = Arc::new(CollectingSink::new());
            let _redirect = StreamRedirect::install(&console, sink, None).unwrap();
            assert_ne!(fd_identity(1), before);
        }
        assert_eq!(fd_identity(1), before);
    }
}
