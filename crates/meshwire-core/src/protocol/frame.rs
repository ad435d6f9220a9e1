//! Stream framing for byte-oriented links (serial, TCP bridge).
//!
//! Every envelope on a stream link is wrapped as:
//!
//! ```text
//! +------+------+--------+--------+---------------------+
//! | 0x94 | 0xC3 | len_hi | len_lo | payload[0..len]     |
//! +------+------+--------+--------+---------------------+
//! ```
//!
//! The device interleaves its console output on the same stream, so anything
//! in front of a marker is padding: it is handed to an optional console sink
//! or logged and dropped.

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, BytesMut};
use thiserror::Error;
use tracing::{trace, warn};

use super::constants::{HEADER_LEN, MAX_FRAME_PAYLOAD, MAX_PADDING_LEN, START1, START2};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Payload too large to frame: {len} bytes, maximum {max}")]
    TooLarge { len: usize, max: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wrap an envelope with the start marker and big-endian length header.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(START1);
    buf.push(START2);
    buf.write_u16::<BigEndian>(payload.len() as u16)?;
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Receiver for bytes that precede a frame marker.
pub type ConsoleSink = Box<dyn FnMut(&[u8]) + Send>;

/// Incremental decoder turning a fragmented byte stream into whole frames.
///
/// Bytes that do not yet form a frame are retained between calls to
/// [`feed`](Self::feed); a frame is never emitted partially.
pub struct FrameDecoder {
    buffer: BytesMut,
    console: Option<ConsoleSink>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_PADDING_LEN),
            console: None,
        }
    }

    /// Forward pre-marker bytes to `sink` instead of logging them.
    pub fn with_console_sink(mut self, sink: impl FnMut(&[u8]) + Send + 'static) -> Self {
        self.console = Some(Box::new(sink));
        self
    }

    /// Append `chunk` and return every frame that is now complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Number of bytes waiting for more input.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop everything retained so far.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.buffer.is_empty() {
                return None;
            }

            let Some(start) = find_marker(&self.buffer) else {
                self.flush_stale_padding();
                return None;
            };

            if start > 0 {
                let padding = self.buffer.split_to(start);
                self.emit_padding(&padding);
            }

            if self.buffer.len() < HEADER_LEN {
                return None;
            }

            let len = u16::from_be_bytes([self.buffer[2], self.buffer[3]]) as usize;

            // A marker inside the payload window means the frame we are looking
            // at was truncated and a new one started: resync on the inner marker.
            let available = self.buffer.len().min(HEADER_LEN + len);
            if let Some(inner) = find_marker(&self.buffer[HEADER_LEN..available]) {
                warn!(
                    declared_len = len,
                    discarded = HEADER_LEN + inner,
                    "Malformed frame, resynchronizing"
                );
                self.buffer.advance(HEADER_LEN + inner);
                continue;
            }

            if self.buffer.len() < HEADER_LEN + len {
                return None;
            }

            self.buffer.advance(HEADER_LEN);
            let frame = self.buffer.split_to(len).to_vec();
            trace!(len, "Frame decoded");
            return Some(frame);
        }
    }

    /// With no marker in sight, keep the buffer bounded by releasing all but a
    /// trailing first-marker byte.
    fn flush_stale_padding(&mut self) {
        if self.buffer.len() <= MAX_PADDING_LEN {
            return;
        }
        let keep = usize::from(self.buffer.last() == Some(&START1));
        let padding = self.buffer.split_to(self.buffer.len() - keep);
        self.emit_padding(&padding);
    }

    fn emit_padding(&mut self, padding: &[u8]) {
        match self.console.as_mut() {
            Some(sink) => sink(padding),
            None => warn!(len = padding.len(), "Discarding bytes before frame marker"),
        }
    }
}

fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w[0] == START1 && w[1] == START2)
}
