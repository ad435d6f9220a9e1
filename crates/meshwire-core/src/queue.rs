//! Outbound send queue.
//!
//! Every envelope handed to the device goes through [`SendQueue`]: it is
//! written in FIFO order with a pacing delay in front of each write, and the
//! caller gets a [`PendingPacket`] that resolves when the device reports the
//! delivery outcome for that packet id. Outcomes may arrive in any order;
//! correlation is strictly by id.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, error, trace, warn};

use crate::protocol::constants::{DEFAULT_PACING, DEFAULT_PACKET_TIMEOUT};
use crate::schema::RoutingError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Packet {0} does not exist")]
    NotFound(u32),

    #[error("Packet {0} is already queued")]
    DuplicateId(u32),

    #[error("Packet {0} is already being awaited")]
    AlreadyAwaited(u32),

    #[error("Packet {id} failed: {reason:?}")]
    Rejected { id: u32, reason: RoutingError },

    #[error("Packet {0} was abandoned when the queue was cleared")]
    Cancelled(u32),
}

impl QueueError {
    /// The device never answered within the packet timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            QueueError::Rejected {
                reason: RoutingError::Timeout,
                ..
            }
        )
    }
}

type Outcome = Result<u32, QueueError>;

struct QueueItem {
    id: u32,
    bytes: Vec<u8>,
    sent: bool,
    resolver: Option<oneshot::Sender<Outcome>>,
    waiter: Option<oneshot::Receiver<Outcome>>,
    timer: AbortHandle,
}

impl QueueItem {
    fn resolve(mut self, outcome: Outcome) {
        self.timer.abort();
        if let Some(resolver) = self.resolver.take() {
            // The caller may have dropped its PendingPacket.
            let _ = resolver.send(outcome);
        }
    }
}

struct Shared {
    items: Mutex<Vec<QueueItem>>,
    draining: AtomicBool,
    pacing: Duration,
    timeout: Duration,
}

impl Shared {
    fn items(&self) -> MutexGuard<'_, Vec<QueueItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, id: u32) -> Option<QueueItem> {
        let mut items = self.items();
        let pos = items.iter().position(|item| item.id == id)?;
        Some(items.remove(pos))
    }

    fn expire(&self, id: u32) {
        if let Some(item) = self.take(id) {
            warn!(id, timeout = ?self.timeout, "Packet timed out");
            item.resolve(Err(QueueError::Rejected {
                id,
                reason: RoutingError::Timeout,
            }));
        }
    }
}

/// Holds the drain lock. Dropping it releases the lock, so a drain future
/// cancelled mid-write does not wedge the queue.
struct DrainGuard<'a> {
    shared: &'a Shared,
}

impl<'a> DrainGuard<'a> {
    fn try_acquire(shared: &'a Shared) -> Option<Self> {
        if shared.draining.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self { shared })
    }

    /// Release the lock and report whether anything is still unsent. An item
    /// pushed after the drain's last check saw the lock held and was skipped
    /// by its own caller.
    fn release(self) -> bool {
        let shared = self.shared;
        drop(self);
        shared.items().iter().any(|item| !item.sent)
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.shared.draining.store(false, Ordering::Release);
    }
}

/// Paced FIFO of outbound envelopes with per-id completion.
#[derive(Clone)]
pub struct SendQueue {
    shared: Arc<Shared>,
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PACING, DEFAULT_PACKET_TIMEOUT)
    }
}

impl SendQueue {
    pub fn new(pacing: Duration, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                items: Mutex::new(Vec::new()),
                draining: AtomicBool::new(false),
                pacing,
                timeout,
            }),
        }
    }

    /// Enqueue `bytes` under `id` and arm its timeout.
    ///
    /// Must be called from within a tokio runtime.
    pub fn push(&self, id: u32, bytes: Vec<u8>) -> Result<(), QueueError> {
        let mut items = self.shared.items();
        if items.iter().any(|item| item.id == id) {
            return Err(QueueError::DuplicateId(id));
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let timeout = self.shared.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.expire(id);
            }
        })
        .abort_handle();

        let (resolver, waiter) = oneshot::channel();
        trace!(id, len = bytes.len(), "Packet queued");
        items.push(QueueItem {
            id,
            bytes,
            sent: false,
            resolver: Some(resolver),
            waiter: Some(waiter),
            timer,
        });
        Ok(())
    }

    /// Completion future for a queued id. Each id can be awaited once.
    pub fn wait(&self, id: u32) -> Result<PendingPacket, QueueError> {
        let mut items = self.shared.items();
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(QueueError::NotFound(id))?;
        let rx = item.waiter.take().ok_or(QueueError::AlreadyAwaited(id))?;
        Ok(PendingPacket { id, rx })
    }

    /// Resolve `id` successfully. Returns false for an unknown id.
    pub fn process_ack(&self, id: u32) -> bool {
        match self.shared.take(id) {
            Some(item) => {
                debug!(id, "Packet acknowledged");
                item.resolve(Ok(id));
                true
            }
            None => {
                trace!(id, "Ack for unknown packet");
                false
            }
        }
    }

    /// Reject `id` with a device-reported routing error.
    pub fn process_error(&self, id: u32, reason: RoutingError) -> bool {
        error!(id, ?reason, "Device reported delivery failure");
        match self.shared.take(id) {
            Some(item) => {
                item.resolve(Err(QueueError::Rejected { id, reason }));
                true
            }
            None => false,
        }
    }

    /// Write every unsent item in FIFO order, sleeping the pacing delay before
    /// each write. A call made while another drain is running returns at once.
    pub async fn process_queue<F, Fut, E>(&self, mut write: F) -> Result<(), E>
    where
        F: FnMut(Vec<u8>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        loop {
            let Some(guard) = DrainGuard::try_acquire(&self.shared) else {
                return Ok(());
            };

            while let Some((id, bytes)) = self.next_unsent() {
                tokio::time::sleep(self.shared.pacing).await;

                // Resolved or expired during the pacing delay.
                if !self.contains(id) {
                    continue;
                }

                write(bytes).await?;
                self.mark_sent(id);
                trace!(id, "Packet written");
            }

            if !guard.release() {
                return Ok(());
            }
            trace!("Packets queued while the drain was finishing, draining again");
        }
    }

    /// Drop every item. Outstanding [`PendingPacket`]s resolve to
    /// [`QueueError::Cancelled`].
    pub fn clear(&self) -> usize {
        let drained: Vec<QueueItem> = self.shared.items().drain(..).collect();
        let count = drained.len();
        for item in drained {
            item.timer.abort();
        }
        if count > 0 {
            debug!(count, "Send queue cleared");
        }
        count
    }

    pub fn contains(&self, id: u32) -> bool {
        self.shared.items().iter().any(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.shared.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unsent_len(&self) -> usize {
        self.shared.items().iter().filter(|item| !item.sent).count()
    }

    fn next_unsent(&self) -> Option<(u32, Vec<u8>)> {
        self.shared
            .items()
            .iter()
            .find(|item| !item.sent)
            .map(|item| (item.id, item.bytes.clone()))
    }

    fn mark_sent(&self, id: u32) {
        if let Some(item) = self.shared.items().iter_mut().find(|item| item.id == id) {
            item.sent = true;
        }
    }
}

/// Resolves with the packet id once the device acknowledges it.
#[derive(Debug)]
pub struct PendingPacket {
    id: u32,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingPacket {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Future for PendingPacket {
    type Output = Result<u32, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::Cancelled(id))),
            Poll::Pending => Poll::Pending,
        }
    }
}
