//! Streamed output events and the sinks that receive them.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Kind of a streamed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A chunk of guest stdout (or build progress).
    Output,
    /// A chunk of guest stderr, a diagnostic, or an engine error.
    Error,
    /// Terminal event; exactly one per run.
    Completed,
}

/// One streamed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Event payload.
    pub content: String,
}

impl OutputEvent {
    pub fn output(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Output,
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            content: content.into(),
        }
    }

    pub fn completed(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Completed,
            content: content.into(),
        }
    }
}

/// Receiver of streamed events.
///
/// Implementations must not block for long: events are emitted from pump
/// threads while the guest program is running.
pub trait OutputSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: OutputEvent);

    /// Deliver a stdout chunk.
    fn output(&self, content: &str) {
        self.emit(OutputEvent::output(content));
    }

    /// Deliver a stderr chunk or error message.
    fn error(&self, content: &str) {
        self.emit(OutputEvent::error(content));
    }
}

impl OutputSink for mpsc::UnboundedSender<OutputEvent> {
    fn emit(&self, event: OutputEvent) {
        // Receiver gone means the client stopped listening.
        let _ = self.send(event);
    }
}

/// Sink that records every event, used by tests and the CLI summary.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<OutputEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<OutputEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Concatenated content of all events of `kind`.
    pub fn text(&self, kind: EventKind) -> String {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.content)
            .collect()
    }

    /// Number of `completed` events seen.
    pub fn completed_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| e.kind == EventKind::Completed)
            .count()
    }
}

impl OutputSink for CollectingSink {
    fn emit(&self, event: OutputEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Splits a byte stream into UTF-8 text chunks without breaking code points.
///
/// Bytes of an incomplete trailing sequence are held back until the next
/// chunk arrives; invalid bytes are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, returning the text that is complete so far.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let keep = incomplete_tail_len(&self.pending);
        let split = self.pending.len() - keep;
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    /// Flush any held-back bytes at end of stream.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of an incomplete UTF-8 sequence at the end of `bytes` (0..=3).
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=3.min(len) {
        let b = bytes[len - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            // continuation byte, keep looking for the lead byte
            continue;
        }
        let needed = if b & 0b1110_0000 == 0b1100_0000 {
            2
        } else if b & 0b1111_0000 == 0b1110_0000 {
            3
        } else if b & 0b1111_1000 == 0b1111_0000 {
            4
        } else {
            1
        };
        return if needed > back { back } else { 0 };
    }
    0
}
