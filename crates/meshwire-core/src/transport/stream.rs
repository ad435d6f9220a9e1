//! Byte-stream transport over any tokio reader/writer pair.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use super::traits::{BoxFuture, Framing, Transport, TransportError};
use crate::protocol::encode_frame;

const READ_BUFFER_SIZE: usize = 4096;

type Reader = Box<dyn AsyncRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Framed transport for serial-like links.
///
/// Outbound envelopes are wrapped with [`encode_frame`]; inbound bytes are
/// handed to the session unparsed for its frame decoder.
pub struct StreamTransport {
    reader: Mutex<Reader>,
    writer: Mutex<Writer>,
}

impl StreamTransport {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer)
    }

    pub fn from_parts<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Mutex::new(Box::new(reader)),
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Connect to a device's TCP serial bridge.
    pub async fn connect_tcp<A>(addr: A) -> Result<Self, TransportError>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| TransportError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        info!(%addr, "Connected");
        let (reader, writer) = stream.into_split();
        Ok(Self::from_parts(reader, writer))
    }
}

impl Transport for StreamTransport {
    fn write(&self, envelope: Vec<u8>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let frame = encode_frame(&envelope)?;
            let mut writer = self.writer.lock().await;
            writer.write_all(&frame).await?;
            writer.flush().await?;
            trace!(len = frame.len(), "Frame written");
            Ok(())
        })
    }

    fn read(&self) -> BoxFuture<'_, Result<Option<Vec<u8>>, TransportError>> {
        Box::pin(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            let n = self.reader.lock().await.read(&mut buf).await?;
            if n == 0 {
                debug!("Stream closed by peer");
                return Ok(None);
            }
            buf.truncate(n);
            Ok(Some(buf))
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.writer.lock().await.shutdown().await?;
            Ok(())
        })
    }

    fn framing(&self) -> Framing {
        Framing::Stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameDecoder;

    #[tokio::test]
    async fn test_write_adds_frame_header() {
        let (client, mut device) = tokio::io::duplex(1024);
        let transport = StreamTransport::new(client);

        transport.write(vec![0x18, 0x2A]).await.unwrap();

        let mut buf = [0u8; 6];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x94, 0xC3, 0x00, 0x02, 0x18, 0x2A]);
    }

    #[tokio::test]
    async fn test_read_returns_raw_chunks_then_eof() {
        let (client, mut device) = tokio::io::duplex(1024);
        let transport = StreamTransport::new(client);

        let mut stream = b"console\n".to_vec();
        stream.extend(encode_frame(b"env").unwrap());
        device.write_all(&stream).await.unwrap();
        drop(device);

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        while let Some(chunk) = transport.read().await.unwrap() {
            frames.extend(decoder.feed(&chunk));
        }
        assert_eq!(frames, vec![b"env".to_vec()]);
        assert_eq!(transport.framing(), Framing::Stream);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = StreamTransport::connect_tcp(addr.as_str()).await.err().unwrap();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
    }
}
