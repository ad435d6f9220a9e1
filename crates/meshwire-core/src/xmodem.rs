//! XModem-style chunked file transfer over `ToRadio`/`FromRadio`.
//!
//! [`XModemTransfer`] only tracks transfer state and decides what to answer;
//! the session owns the link and sends whatever [`XModemAction::Send`] asks
//! for. Retransmission is driven by the peer's NAKs, never by a timer.
//!
//! Upload sequence, one 128-byte chunk per sequence number:
//!
//! ```text
//! client                     device
//!   SOH seq=0 chunk0   ->
//!                      <-    ACK | NAK (resend seq=0)
//!   SOH seq=1 chunk1   ->
//!                      <-    ACK | NAK (resend seq=1)
//!   ...
//!   EOT                ->
//!                      <-    ACK
//! ```

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::protocol::constants::XMODEM_CHUNK_SIZE;
use crate::schema::{XModem, XModemControl};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XModemError {
    #[error("File name must not be empty")]
    EmptyName,
    #[error("File name is {len} bytes, maximum {max}")]
    NameTooLong { len: usize, max: usize },
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection).
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// What the session should do after a packet was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum XModemAction {
    None,
    Send(XModem),
    /// A download finished; the chunks in sequence order.
    Complete(Vec<u8>),
}

#[derive(Debug, Default)]
pub struct XModemTransfer {
    counter: u32,
    rx_chunks: BTreeMap<u32, Vec<u8>>,
    tx_chunks: Vec<Vec<u8>>,
    uploading: bool,
}

impl XModemTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `name` from the device.
    pub fn download_file(&mut self, name: &str) -> Result<XModem, XModemError> {
        let name = validate_name(name)?;
        self.reset();
        info!(file = %String::from_utf8_lossy(&name), "Requesting file download");
        Ok(control(XModemControl::Stx, 0, name))
    }

    /// Start sending `data` as `name`. Returns the first chunk, or EOT when
    /// `data` is empty.
    pub fn upload_file(&mut self, name: &str, data: &[u8]) -> Result<XModem, XModemError> {
        let name = validate_name(name)?;
        self.reset();
        self.tx_chunks = data.chunks(XMODEM_CHUNK_SIZE).map(<[u8]>::to_vec).collect();
        self.uploading = true;
        info!(
            file = %String::from_utf8_lossy(&name),
            bytes = data.len(),
            chunks = self.tx_chunks.len(),
            "Starting file upload"
        );
        Ok(self.current_packet())
    }

    pub fn handle_packet(&mut self, packet: &XModem) -> XModemAction {
        let Ok(code) = XModemControl::try_from(packet.control) else {
            warn!(control = packet.control, "Unknown XModem control code");
            return XModemAction::None;
        };

        match code {
            XModemControl::Soh => {
                if u32::from(crc16_ccitt(&packet.buffer)) == packet.crc16 {
                    self.rx_chunks.insert(packet.seq, packet.buffer.clone());
                    XModemAction::Send(control(XModemControl::Ack, packet.seq, Vec::new()))
                } else {
                    warn!(seq = packet.seq, "XModem chunk failed CRC check");
                    XModemAction::Send(control(XModemControl::Nak, packet.seq, Vec::new()))
                }
            }
            XModemControl::Ack => self.on_ack(),
            XModemControl::Nak => self.on_nak(),
            XModemControl::Eot => {
                let data: Vec<u8> = self.rx_chunks.values().flatten().copied().collect();
                info!(bytes = data.len(), chunks = self.rx_chunks.len(), "File received");
                self.reset();
                XModemAction::Complete(data)
            }
            XModemControl::Can => {
                info!("XModem transfer cancelled by peer");
                self.reset();
                XModemAction::None
            }
            XModemControl::Nul | XModemControl::Stx | XModemControl::Ctrlz => {
                debug!(?code, "Ignoring XModem control");
                XModemAction::None
            }
        }
    }

    /// Abort any transfer and drop buffered chunks.
    pub fn reset(&mut self) {
        self.counter = 0;
        self.rx_chunks.clear();
        self.tx_chunks.clear();
        self.uploading = false;
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    pub fn received_chunks(&self) -> usize {
        self.rx_chunks.len()
    }

    pub fn pending_chunks(&self) -> usize {
        self.tx_chunks.len()
    }

    fn on_ack(&mut self) -> XModemAction {
        if !self.uploading {
            debug!("XModem ACK without an upload in progress");
            return XModemAction::None;
        }

        self.counter += 1;
        if self.counter as usize > self.tx_chunks.len() {
            info!("File upload complete");
            self.reset();
            return XModemAction::None;
        }
        debug!(seq = self.counter, "Chunk acknowledged, sending next");
        XModemAction::Send(self.current_packet())
    }

    fn on_nak(&mut self) -> XModemAction {
        if !self.uploading {
            debug!("XModem NAK without an upload in progress");
            return XModemAction::None;
        }

        warn!(seq = self.counter, "Chunk rejected, resending");
        XModemAction::Send(self.current_packet())
    }

    /// The chunk at `counter`, or EOT once every chunk was acknowledged.
    fn current_packet(&self) -> XModem {
        match self.tx_chunks.get(self.counter as usize) {
            Some(chunk) => data_packet(self.counter, chunk.clone()),
            None => control(XModemControl::Eot, self.counter, Vec::new()),
        }
    }
}

fn validate_name(name: &str) -> Result<Vec<u8>, XModemError> {
    if name.is_empty() {
        return Err(XModemError::EmptyName);
    }
    if name.len() > XMODEM_CHUNK_SIZE {
        return Err(XModemError::NameTooLong {
            len: name.len(),
            max: XMODEM_CHUNK_SIZE,
        });
    }
    Ok(name.as_bytes().to_vec())
}

fn data_packet(seq: u32, buffer: Vec<u8>) -> XModem {
    XModem {
        control: XModemControl::Soh as i32,
        seq,
        crc16: u32::from(crc16_ccitt(&buffer)),
        buffer,
    }
}

fn control(code: XModemControl, seq: u32, buffer: Vec<u8>) -> XModem {
    XModem {
        control: code as i32,
        seq,
        crc16: 0,
        buffer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(code: XModemControl, seq: u32) -> XModem {
        control(code, seq, Vec::new())
    }

    fn sent(action: XModemAction) -> XModem {
        match action {
            XModemAction::Send(packet) => packet,
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
        assert_eq!(crc16_ccitt(&[]), 0xFFFF);
    }

    #[test]
    fn test_upload_300_bytes() {
        let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut xfer = XModemTransfer::new();

        let first = xfer.upload_file("fw.bin", &data).unwrap();
        assert_eq!(first.control, XModemControl::Soh as i32);
        assert_eq!((first.seq, first.buffer.len()), (0, 128));
        assert_eq!(first.buffer, &data[..128]);
        assert_eq!(first.crc16, u32::from(crc16_ccitt(&data[..128])));
        assert_eq!(xfer.pending_chunks(), 3);

        let second = sent(xfer.handle_packet(&peer(XModemControl::Ack, 0)));
        assert_eq!((second.seq, second.buffer.len()), (1, 128));

        // NAK on chunk 2 resends chunk 2, not chunk 3.
        let resent = sent(xfer.handle_packet(&peer(XModemControl::Nak, 1)));
        assert_eq!(resent.seq, 1);
        assert_eq!(resent.buffer, &data[128..256]);
        assert_eq!(resent.crc16, u32::from(crc16_ccitt(&data[128..256])));

        let third = sent(xfer.handle_packet(&peer(XModemControl::Ack, 1)));
        assert_eq!((third.seq, third.buffer.len()), (2, 44));
        assert_eq!(third.buffer, &data[256..]);

        let eot = sent(xfer.handle_packet(&peer(XModemControl::Ack, 2)));
        assert_eq!(eot.control, XModemControl::Eot as i32);
        assert_eq!(eot.seq, 3);

        // The ACK for EOT ends the transfer.
        assert_eq!(
            xfer.handle_packet(&peer(XModemControl::Ack, 3)),
            XModemAction::None
        );
        assert!(!xfer.is_uploading());
    }

    #[test]
    fn test_nak_on_first_chunk_resends_it() {
        let mut xfer = XModemTransfer::new();
        let first = xfer.upload_file("a.txt", b"abc").unwrap();
        let again = sent(xfer.handle_packet(&peer(XModemControl::Nak, 0)));
        assert_eq!(again, first);
        assert_eq!(again.buffer, b"abc");
    }

    #[test]
    fn test_cancel_clears_everything() {
        let mut xfer = XModemTransfer::new();
        xfer.upload_file("big", &[0u8; 1000]).unwrap();
        xfer.handle_packet(&peer(XModemControl::Ack, 0));
        assert_eq!(xfer.pending_chunks(), 8);

        assert_eq!(
            xfer.handle_packet(&peer(XModemControl::Can, 0)),
            XModemAction::None
        );
        assert_eq!(xfer.pending_chunks(), 0);
        assert!(!xfer.is_uploading());
        assert_eq!(
            xfer.handle_packet(&peer(XModemControl::Ack, 1)),
            XModemAction::None
        );
    }

    #[test]
    fn test_download_collects_in_seq_order() {
        let mut xfer = XModemTransfer::new();
        let request = xfer.download_file("log.txt").unwrap();
        assert_eq!(request.control, XModemControl::Stx as i32);
        assert_eq!(request.seq, 0);
        assert_eq!(request.buffer, b"log.txt");

        // Out-of-order arrival still concatenates by seq.
        for (seq, chunk) in [(2u32, b"world".as_slice()), (1, b"hello ".as_slice())] {
            let ack = sent(xfer.handle_packet(&data_packet(seq, chunk.to_vec())));
            assert_eq!(ack.control, XModemControl::Ack as i32);
            assert_eq!(ack.seq, seq);
        }

        assert_eq!(
            xfer.handle_packet(&peer(XModemControl::Eot, 3)),
            XModemAction::Complete(b"hello world".to_vec())
        );
        assert_eq!(xfer.received_chunks(), 0);
    }

    #[test]
    fn test_bad_crc_is_nakked_and_not_stored() {
        let mut xfer = XModemTransfer::new();
        let mut chunk = data_packet(1, b"payload".to_vec());
        chunk.crc16 ^= 0x0001;

        let nak = sent(xfer.handle_packet(&chunk));
        assert_eq!(nak.control, XModemControl::Nak as i32);
        assert_eq!(nak.seq, 1);
        assert_eq!(xfer.received_chunks(), 0);
    }

    #[test]
    fn test_invalid_names() {
        let mut xfer = XModemTransfer::new();
        assert_eq!(xfer.download_file(""), Err(XModemError::EmptyName));
        let long = "x".repeat(XMODEM_CHUNK_SIZE + 1);
        assert!(matches!(
            xfer.upload_file(&long, b"data"),
            Err(XModemError::NameTooLong { .. })
        ));
    }

    #[test]
    fn test_empty_upload_goes_straight_to_eot() {
        let mut xfer = XModemTransfer::new();
        let eot = xfer.upload_file("empty", &[]).unwrap();
        assert_eq!((eot.control, eot.seq), (XModemControl::Eot as i32, 0));
        assert_eq!(
            xfer.handle_packet(&peer(XModemControl::Ack, 0)),
            XModemAction::None
        );
        assert!(!xfer.is_uploading());
    }
}
