//! Transport layer abstraction.
//!
//! Defines the `Transport` trait the session talks through, so a byte stream
//! (serial, TCP bridge) and a packet link (BLE characteristic, HTTP body)
//! can be swapped without the session knowing which one it holds.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::protocol::FrameError;

/// Boxed future returned by [`Transport`] methods, keeping the trait object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How inbound chunks relate to envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Arbitrary fragments of a `0x94 0xC3`-framed byte stream.
    Stream,
    /// Each chunk is exactly one serialized envelope.
    Packet,
}

/// Abstract device link.
///
/// `read` and `write` may be called concurrently from different tasks.
pub trait Transport: Send + Sync {
    /// Send one serialized `ToRadio`. Stream transports add the frame header.
    fn write(&self, envelope: Vec<u8>) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Next inbound chunk, or `None` once the link is closed.
    fn read(&self) -> BoxFuture<'_, Result<Option<Vec<u8>>, TransportError>>;

    /// Close the link. Pending reads return `None` or an error afterwards.
    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>>;

    fn framing(&self) -> Framing;
}
