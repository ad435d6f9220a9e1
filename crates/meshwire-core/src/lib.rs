//! meshwire-core: client-side protocol engine for mesh-radio devices.
//!
//! A host program talks to a radio through length-prefixed protobuf
//! envelopes. This crate owns everything between the byte link and the
//! application: framing, paced and acknowledged sending, the configuration
//! handshake, inbound dispatch into typed events, and XModem file transfers.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: wire constants and the stream frame codec
//! - **Schema**: prost message definitions for the radio envelopes
//! - **Transport**: byte-link abstraction (TCP/serial streams, mock)
//! - **Queue**: paced outbound queue with ack correlation and timeouts
//! - **XModem**: chunked file transfer state machine
//! - **State**: session status and inbound handlers
//! - **Events**: broadcast bus plus observer hooks for UI decoupling
//! - **Session**: the orchestrator tying it all together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use meshwire_core::{DeviceSession, SessionConfig, StreamTransport};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let transport = Arc::new(StreamTransport::connect_tcp("192.168.1.20:4403").await?);
//! let session = Arc::new(DeviceSession::new(transport, SessionConfig::default()));
//!
//! let reader = tokio::spawn({
//!     let session = session.clone();
//!     async move { session.run().await }
//! });
//! session.connect().await?;
//! session.send_text("hello mesh", Default::default()).await?.await?;
//! session.disconnect().await?;
//! reader.await??;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod protocol;
pub mod queue;
pub mod schema;
pub mod session;
pub mod shutdown;
pub mod state;
pub mod transport;
pub mod xmodem;

// Re-exports for convenience
pub use events::{
    DeviceEvent, DeviceObserver, EventBus, NullObserver, Packet, PacketKind, PacketMeta,
    TracingObserver,
};
pub use protocol::{FrameDecoder, FrameError, encode_frame};
pub use queue::{PendingPacket, QueueError, SendQueue};
pub use session::{Destination, DeviceSession, PacketOptions, SessionConfig, SessionError};
pub use shutdown::ShutdownToken;
pub use state::{DeviceStatus, SessionState};
pub use transport::{Framing, MockTransport, StreamTransport, Transport, TransportError};
pub use xmodem::{XModemAction, XModemError, XModemTransfer};
