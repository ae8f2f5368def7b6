use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::session::InputEvent;

/// Where subscriber keystrokes end up.
pub trait OutputSink: Send + Sync + 'static {
    /// Write one character and flush it immediately.
    fn write_char(&self, ch: char) -> io::Result<()>;
}

/// Process stdout, flushed after every character.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_char(&self, ch: char) -> io::Result<()> {
        let mut buf = [0u8; 4];
        let mut out = io::stdout().lock();
        out.write_all(ch.encode_utf8(&mut buf).as_bytes())?;
        out.flush()
    }
}

/// In-memory sink, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    written: Mutex<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.written.lock().clone()
    }
}

impl OutputSink for MemorySink {
    fn write_char(&self, ch: char) -> io::Result<()> {
        self.written.lock().push(ch);
        Ok(())
    }
}

/// Drain subscriber input into the sink, one character at a time, in the
/// order the queue received them.
///
/// Sink writes block (stdout may be a full pipe), so the relay runs on the
/// blocking pool. It ends once every sender is dropped.
pub fn start_input_relay(
    mut rx: mpsc::Receiver<InputEvent>,
    sink: Arc<dyn OutputSink>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Some((subscriber_id, ch)) = rx.blocking_recv() {
            if let Err(e) = sink.write_char(ch) {
                tracing::warn!(subscriber_id = %subscriber_id, error = %e, "output sink write failed");
            }
        }
        tracing::debug!("input relay closed");
    })
}
