//! Wire-level constants shared by the framing, queue and session layers.

use std::time::Duration;

// Stream framing: 0x94 0xC3 <len hi> <len lo> <payload>
pub const START1: u8 = 0x94;
pub const START2: u8 = 0xC3;
pub const HEADER_LEN: usize = 4;
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Largest serialized `ToRadio` the device link accepts.
pub const MAX_TO_RADIO_SIZE: usize = 512;

/// Bytes of marker-less input retained before they are flushed as console text.
pub const MAX_PADDING_LEN: usize = 1024;

// Node addressing
pub const BROADCAST_NUM: u32 = 0xFFFF_FFFF;

// Send queue
pub const DEFAULT_PACING: Duration = Duration::from_millis(200);
pub const DEFAULT_PACKET_TIMEOUT: Duration = Duration::from_secs(60);

// XModem
pub const XMODEM_CHUNK_SIZE: usize = 128;
pub const DEFAULT_XMODEM_REPLY_DELAY: Duration = Duration::from_millis(100);

/// Oldest firmware (major, minor) this client speaks to without complaint.
pub const MIN_FIRMWARE_VERSION: (u32, u32) = (2, 2);

/// Queue-status free slots below which the device queue is reported as nearly full.
pub const QUEUE_LOW_WATERMARK: u32 = 4;
