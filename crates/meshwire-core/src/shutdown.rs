//! Cancellation signal shared by everything a session runs in the background.

use tokio::sync::watch;

/// One-way stop signal.
///
/// The read loop, the queue drain and the heartbeat all race their I/O
/// against [`cancelled`](Self::cancelled); once [`signal_stop`](Self::signal_stop)
/// is called every one of them returns at its next suspension point.
#[derive(Debug)]
pub struct ShutdownToken {
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self { stop_tx, stop_rx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Idempotent.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Resolve once the stop signal has been sent.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}
