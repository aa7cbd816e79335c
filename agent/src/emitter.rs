//! Event emitter
//!
//! Fire-and-forget delivery of host records. Sinks never block the calling
//! thread for long and never report failure back to the probe: a host that has
//! gone away simply stops receiving records.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::warn;
use xpcspy_shared::protocol::wire::Envelope;
use xpcspy_shared::types::events::{HostMessage, TraceEvent};

/// Destination for records produced by probes
pub trait EventSink: Send + Sync {
    fn send(&self, message: HostMessage);

    fn emit(&self, event: TraceEvent) {
        self.send(event.into());
    }

    fn emit_hooks_installed(&self) {
        self.send(HostMessage::HooksInstalled);
    }
}

/// Unbounded channel to an async consumer
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<HostMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn send(&self, message: HostMessage) {
        // A closed receiver means the host detached; drop silently.
        let _ = self.tx.send(message);
    }
}

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<HostMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HostMessage>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of everything sent so far, in arrival order
    pub fn records(&self) -> Vec<HostMessage> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn send(&self, message: HostMessage) {
        self.lock().push(message);
    }
}

/// Writes each record as one JSON envelope per line
pub struct LineSink<W: Write + Send> {
    writer: Mutex<W>,
    sequence: AtomicU64,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> EventSink for LineSink<W> {
    fn send(&self, message: HostMessage) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let line = match Envelope::new(sequence, message).to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode record {}: {}", sequence, e);
                return;
            }
        };

        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!("Failed to write record {}: {}", sequence, e);
        }
    }
}
