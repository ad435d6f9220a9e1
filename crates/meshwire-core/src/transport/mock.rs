//! Mock transport for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prost::Message;
use tokio::sync::{Notify, mpsc};

use super::traits::{BoxFuture, Framing, Transport, TransportError};
use crate::schema::ToRadio;

/// In-memory transport for session tests.
///
/// Inbound chunks are injected with [`push_inbound`](Self::push_inbound);
/// every write is captured and can be inspected or awaited.
pub struct MockTransport {
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    written: Notify,
    connected: AtomicBool,
    framing: Framing,
}

impl MockTransport {
    /// A packet-framed mock: each injected chunk is one envelope.
    pub fn new() -> Self {
        Self::with_framing(Framing::Packet)
    }

    pub fn with_framing(framing: Framing) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: tokio::sync::Mutex::new(rx),
            write_log: Arc::new(Mutex::new(Vec::new())),
            written: Notify::new(),
            connected: AtomicBool::new(true),
            framing,
        }
    }

    /// Queue a chunk to be returned by the next read.
    pub fn push_inbound(&self, chunk: impl Into<Vec<u8>>) {
        if let Some(tx) = lock(&self.inbound_tx).as_ref() {
            let _ = tx.send(chunk.into());
        }
    }

    /// End the inbound stream; reads return `None` once drained.
    pub fn close_inbound(&self) {
        lock(&self.inbound_tx).take();
    }

    /// Get all captured writes.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.write_log).clone()
    }

    /// Captured writes decoded as `ToRadio`. Only meaningful for packet framing.
    pub fn sent_envelopes(&self) -> Vec<ToRadio> {
        self.writes()
            .iter()
            .filter_map(|bytes| ToRadio::decode(bytes.as_slice()).ok())
            .collect()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        lock(&self.write_log).clear();
    }

    /// Wait until at least `count` writes were captured.
    pub async fn wait_for_writes(&self, count: usize) {
        loop {
            let notified = self.written.notified();
            if lock(&self.write_log).len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Simulate a link failure: subsequent reads and writes fail.
    pub fn fail(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.close_inbound();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&self, envelope: Vec<u8>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(TransportError::Disconnected);
            }
            lock(&self.write_log).push(envelope);
            self.written.notify_waiters();
            Ok(())
        })
    }

    fn read(&self) -> BoxFuture<'_, Result<Option<Vec<u8>>, TransportError>> {
        Box::pin(async move {
            let chunk = self.inbound_rx.lock().await.recv().await;
            if !self.is_connected() {
                return Err(TransportError::ReadFailed("link lost".into()));
            }
            Ok(chunk)
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.close_inbound();
            Ok(())
        })
    }

    fn framing(&self) -> Framing {
        self.framing
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
