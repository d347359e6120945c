use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use bytes::Bytes;
use log::trace;
use tokio::sync::mpsc;
use crate::stream::worker::Message;

const GATE_CLOSED: u64 = 0;

/// Output counters for one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    /// Chunks handed to the connection
    pub chunks_forwarded: u64,

    /// Bytes handed to the connection
    pub bytes_forwarded: u64,

    /// Chunks discarded because the stream was not publishing
    pub chunks_dropped: u64,

    /// Bytes discarded because the stream was not publishing
    pub bytes_dropped: u64,

    /// Sends the connection rejected
    pub send_failures: u64,
}

/// Mirror of the worker's publish session, read by the muxer's thread.
///
/// Only the worker writes it. Holds the session id while `Publishing`,
/// `GATE_CLOSED` otherwise.
#[derive(Debug, Default)]
pub(crate) struct OutputGate {
    session: AtomicU64,
    chunks_forwarded: AtomicU64,
    bytes_forwarded: AtomicU64,
    chunks_dropped: AtomicU64,
    bytes_dropped: AtomicU64,
    send_failures: AtomicU64,
}

impl OutputGate {
    pub(crate) fn open(&self, session: u64) {
        self.session.store(session, Ordering::Release);
    }

    pub(crate) fn close(&self) {
        self.session.store(GATE_CLOSED, Ordering::Release);
    }

    /// Session currently accepting output
    pub(crate) fn session(&self) -> Option<u64> {
        match self.session.load(Ordering::Acquire) {
            GATE_CLOSED => None,
            session => Some(session),
        }
    }

    pub(crate) fn record_forwarded(&self, len: usize) {
        self.chunks_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, len: usize) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
        self.bytes_dropped.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> PublishStats {
        PublishStats {
            chunks_forwarded: self.chunks_forwarded.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            bytes_dropped: self.bytes_dropped.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Destination for muxer output.
///
/// Safe to call from the encoder thread: it never blocks. Chunks produced
/// while the stream is not publishing are dropped here; the rest are handed
/// to the stream worker, which checks the state again before sending.
#[derive(Debug, Clone)]
pub struct OutputSink {
    gate: Arc<OutputGate>,
    sender: mpsc::UnboundedSender<Message>,
}

impl OutputSink {
    pub(crate) fn new(gate: Arc<OutputGate>, sender: mpsc::UnboundedSender<Message>) -> Self {
        OutputSink { gate, sender }
    }

    /// Emit an owned chunk
    pub fn write(&self, data: Vec<u8>) {
        self.write_shared(Bytes::from(data));
    }

    /// Emit a shared chunk without copying it
    pub fn write_shared(&self, data: Bytes) {
        self.write_parts(vec![data]);
    }

    /// Emit pieces that reach the connection together or not at all
    pub fn write_parts(&self, parts: Vec<Bytes>) {
        let len = total_len(&parts);

        let Some(session) = self.gate.session() else {
            trace!("Dropping {} byte chunk, stream not publishing", len);
            self.gate.record_dropped(len);
            return;
        };

        if self.sender.send(Message::Output { session, parts }).is_err() {
            trace!("Dropping {} byte chunk, stream detached", len);
            self.gate.record_dropped(len);
        }
    }

    /// Check if output would currently be accepted
    pub fn is_open(&self) -> bool {
        self.gate.session().is_some()
    }
}

pub(crate) fn total_len(parts: &[Bytes]) -> usize {
    parts.iter().map(Bytes::len).sum()
}
