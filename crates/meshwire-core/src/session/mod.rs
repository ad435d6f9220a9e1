//! Device session - the orchestrator for one device link.
//!
//! [`DeviceSession`] owns the send queue, the XModem transfer state and the
//! event bus. Its read loop ([`run`](DeviceSession::run)) feeds transport
//! chunks through the frame decoder into the inbound handlers; the `send*`
//! family builds envelopes and pushes them through the queue.

mod admin;
mod packets;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use prost::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{Instant, Interval};
use tracing::{debug, error, info, instrument, warn};

use crate::events::{DeviceEvent, DeviceObserver, EventBus};
use crate::protocol::FrameDecoder;
use crate::protocol::constants::{
    DEFAULT_PACING, DEFAULT_PACKET_TIMEOUT, DEFAULT_XMODEM_REPLY_DELAY, MAX_TO_RADIO_SIZE,
};
use crate::queue::{PendingPacket, QueueError, SendQueue};
use crate::schema::{DeviceMetadata, FromRadio, MyNodeInfo, NodeInfo, ToRadio};
use crate::shutdown::ShutdownToken;
use crate::state::{
    DeviceStatus, HandleResult, HandlerContext, SessionState, handle_from_radio,
};
use crate::transport::{Framing, Transport, TransportError};
use crate::xmodem::{XModemError, XModemTransfer};

pub use packets::{Destination, PacketOptions};

/// Configuration for a device session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fixed handshake token. Random when absent.
    pub config_id: Option<u32>,
    /// Publish console bytes interleaved with frames as events.
    pub debug_console: bool,
    /// Delay before each queued write.
    pub pacing_ms: u64,
    /// How long a packet may wait for its routing outcome.
    pub packet_timeout_secs: u64,
    /// Delay before answering a transfer packet.
    pub xmodem_reply_delay_ms: u64,
    /// Send a keep-alive at this interval while the read loop runs.
    pub heartbeat_interval_secs: Option<u64>,
    /// Events a slow subscriber may lag behind before it misses some.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            config_id: None,
            debug_console: false,
            pacing_ms: DEFAULT_PACING.as_millis() as u64,
            packet_timeout_secs: DEFAULT_PACKET_TIMEOUT.as_secs(),
            xmodem_reply_delay_ms: DEFAULT_XMODEM_REPLY_DELAY.as_millis() as u64,
            heartbeat_interval_secs: None,
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn packet_timeout(&self) -> Duration {
        Duration::from_secs(self.packet_timeout_secs)
    }

    pub fn xmodem_reply_delay(&self) -> Duration {
        Duration::from_millis(self.xmodem_reply_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Envelope too large: {len} bytes, maximum {max}")]
    TooLarge { len: usize, max: usize },

    #[error("Failed to decode envelope: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    XModem(#[from] XModemError),

    #[error("Session is disconnected")]
    NotConnected,
}

/// Device session - one handshake, one queue, one event bus per link.
pub struct DeviceSession {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    events: EventBus,
    queue: SendQueue,
    state: Mutex<SessionState>,
    xmodem: Mutex<XModemTransfer>,
    shutdown: ShutdownToken,
}

impl DeviceSession {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let config_id = config.config_id.unwrap_or_else(random_nonzero);
        Self {
            events: EventBus::new(config.event_capacity),
            queue: SendQueue::new(config.pacing(), config.packet_timeout()),
            state: Mutex::new(SessionState::new(config_id)),
            xmodem: Mutex::new(XModemTransfer::new()),
            shutdown: ShutdownToken::new(),
            transport,
            config,
        }
    }

    /// Create a session with an observer already registered.
    pub fn with_observer(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        observer: Arc<dyn DeviceObserver>,
    ) -> Self {
        let session = Self::new(transport, config);
        session.events.add_observer(observer);
        session
    }

    /// Read loop: decode inbound chunks and dispatch them until the link
    /// closes, fails, or [`disconnect`](Self::disconnect) is called.
    #[instrument(skip(self), fields(config_id = self.config_id()))]
    pub async fn run(&self) -> Result<(), SessionError> {
        let framing = self.transport.framing();
        let mut decoder = self.frame_decoder();
        let mut heartbeat = self
            .config
            .heartbeat_interval()
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));
        info!(?framing, "Read loop started");

        loop {
            let chunk = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Read loop stopped");
                    return Ok(());
                }
                _ = next_tick(&mut heartbeat) => {
                    if let Err(e) = self.heartbeat().await {
                        warn!(error = %e, "Heartbeat failed");
                    }
                    continue;
                }
                chunk = self.transport.read() => chunk,
            };

            match chunk {
                Ok(Some(bytes)) => {
                    let frames = match framing {
                        Framing::Stream => decoder.feed(&bytes),
                        Framing::Packet => vec![bytes],
                    };
                    for frame in frames {
                        if let Err(e) = self.handle_inbound(&frame).await {
                            warn!(error = %e, len = frame.len(), "Failed to handle frame");
                        }
                    }
                }
                Ok(None) => {
                    info!("Transport closed");
                    self.update_device_status(DeviceStatus::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    if self.shutdown.is_stopped() {
                        return Ok(());
                    }
                    error!(error = %e, "Transport read failed");
                    self.update_device_status(DeviceStatus::Reconnecting);
                    return Err(e.into());
                }
            }
        }
    }

    /// Mark the link up and start the handshake.
    ///
    /// The transport is already open when the session is built, so the
    /// session passes through `Connecting` straight to `Connected`. A session
    /// is single use: after [`disconnect`](Self::disconnect) this fails with
    /// [`SessionError::NotConnected`] and the status stays `Disconnected`.
    pub async fn connect(&self) -> Result<PendingPacket, SessionError> {
        self.ensure_running()?;
        self.update_device_status(DeviceStatus::Connecting);
        self.update_device_status(DeviceStatus::Connected);
        self.configure().await
    }

    /// Begin the configuration handshake.
    #[instrument(skip(self), fields(config_id = self.config_id()))]
    pub async fn configure(&self) -> Result<PendingPacket, SessionError> {
        self.ensure_running()?;
        info!("Requesting device configuration");
        self.update_device_status(DeviceStatus::Configuring);
        self.send_to_radio(ToRadio::want_config(self.config_id()))
            .await
    }

    /// Decode one frame as `FromRadio` and dispatch it.
    pub async fn handle_inbound(&self, frame: &[u8]) -> Result<(), SessionError> {
        let message = FromRadio::decode(frame)?;
        let result = self.dispatch(|ctx| handle_from_radio(message, ctx));
        self.apply(result).await
    }

    /// Set the status, emitting an event only when it actually changed.
    pub fn update_device_status(&self, status: DeviceStatus) {
        let previous = lock(&self.state).update_status(status);
        if let Some(previous) = previous {
            self.events.emit(DeviceEvent::StatusChanged {
                from: previous,
                to: status,
            });
        }
    }

    /// Queue a serialized `ToRadio` and start draining.
    ///
    /// The returned future resolves when the device reports the outcome for
    /// `id` (random when not given).
    pub async fn send_raw(
        &self,
        bytes: Vec<u8>,
        id: Option<u32>,
    ) -> Result<PendingPacket, SessionError> {
        if bytes.len() > MAX_TO_RADIO_SIZE {
            return Err(SessionError::TooLarge {
                len: bytes.len(),
                max: MAX_TO_RADIO_SIZE,
            });
        }
        self.ensure_running()?;

        let id = id.unwrap_or_else(|| self.generate_packet_id());
        self.queue.push(id, bytes)?;
        let pending = self.queue.wait(id)?;
        self.drain().await?;
        Ok(pending)
    }

    pub async fn heartbeat(&self) -> Result<(), SessionError> {
        self.send_to_radio(ToRadio::heartbeat()).await.map(|_| ())
    }

    /// Ask the device for a file over XModem. Completion arrives as
    /// [`DeviceEvent::FileReceived`].
    pub async fn download_file(&self, name: &str) -> Result<PendingPacket, SessionError> {
        let request = lock(&self.xmodem).download_file(name)?;
        self.send_to_radio(ToRadio::xmodem(request)).await
    }

    /// Send `data` to the device as `name` over XModem.
    pub async fn upload_file(&self, name: &str, data: &[u8]) -> Result<PendingPacket, SessionError> {
        let first = lock(&self.xmodem).upload_file(name, data)?;
        self.send_to_radio(ToRadio::xmodem(first)).await
    }

    /// Tear the link down: stop the read loop, abandon queued packets,
    /// abort any transfer and close the transport.
    #[instrument(skip(self), fields(config_id = self.config_id()))]
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        info!("Disconnecting");
        self.shutdown.signal_stop();
        let abandoned = self.queue.clear();
        lock(&self.xmodem).reset();
        let closed = self.transport.disconnect().await;
        self.update_device_status(DeviceStatus::Disconnected);
        debug!(abandoned, "Session closed");
        closed.map_err(SessionError::from)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn DeviceObserver>) {
        self.events.add_observer(observer);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> DeviceStatus {
        lock(&self.state).status
    }

    pub fn config_id(&self) -> u32 {
        lock(&self.state).config_id
    }

    pub fn pending_settings_change(&self) -> bool {
        lock(&self.state).pending_settings_change
    }

    /// Our node number, 0 until the device reported it.
    pub fn my_node_num(&self) -> u32 {
        lock(&self.state).my_node_num()
    }

    pub fn my_node_info(&self) -> Option<MyNodeInfo> {
        lock(&self.state).my_node_info.clone()
    }

    pub fn device_metadata(&self) -> Option<DeviceMetadata> {
        lock(&self.state).metadata.clone()
    }

    /// Snapshot of the node table, ordered by node number.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> = lock(&self.state).nodes.values().cloned().collect();
        nodes.sort_by_key(|node| node.num);
        nodes
    }

    pub fn node(&self, num: u32) -> Option<NodeInfo> {
        lock(&self.state).nodes.get(&num).cloned()
    }

    /// Packets still waiting for their outcome.
    pub fn queued_packets(&self) -> usize {
        self.queue.len()
    }

    /// True while an upload is waiting on device replies.
    pub fn is_uploading(&self) -> bool {
        lock(&self.xmodem).is_uploading()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_stopped()
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.shutdown.is_stopped() {
            return Err(SessionError::NotConnected);
        }
        Ok(())
    }

    async fn send_to_radio(&self, message: ToRadio) -> Result<PendingPacket, SessionError> {
        debug!(variant = message.variant_name(), "Sending envelope");
        self.send_raw(message.encode_to_vec(), None).await
    }

    async fn drain(&self) -> Result<(), SessionError> {
        let transport = Arc::clone(&self.transport);
        let write = move |bytes: Vec<u8>| {
            let transport = Arc::clone(&transport);
            async move { transport.write(bytes).await }
        };

        let drained = tokio::select! {
            result = self.queue.process_queue(write) => result,
            _ = self.shutdown.cancelled() => return Err(SessionError::NotConnected),
        };

        drained.map_err(|e| {
            error!(error = %e, "Transport write failed");
            self.update_device_status(DeviceStatus::Reconnecting);
            SessionError::from(e)
        })
    }

    /// Run a handler against the session state. Locks are released on return.
    fn dispatch<R>(&self, handler: impl FnOnce(&mut HandlerContext<'_>) -> R) -> R {
        let mut state = lock(&self.state);
        let mut xmodem = lock(&self.xmodem);
        let mut ctx = HandlerContext {
            state: &mut state,
            events: &self.events,
            queue: &self.queue,
            xmodem: &mut xmodem,
        };
        handler(&mut ctx)
    }

    async fn apply(&self, result: HandleResult) -> Result<(), SessionError> {
        match result {
            HandleResult::Continue => Ok(()),
            HandleResult::Reconfigure => {
                if let Err(e) = self.configure().await {
                    warn!(error = %e, "Failed to restart handshake after reboot");
                }
                Ok(())
            }
            HandleResult::XModemReply(packet) => {
                tokio::time::sleep(self.config.xmodem_reply_delay()).await;
                self.send_to_radio(ToRadio::xmodem(packet)).await?;
                Ok(())
            }
        }
    }

    fn frame_decoder(&self) -> FrameDecoder {
        let decoder = FrameDecoder::new();
        if !self.config.debug_console {
            return decoder;
        }
        let events = self.events.clone();
        decoder.with_console_sink(move |bytes| {
            events.emit(DeviceEvent::ConsoleText(
                String::from_utf8_lossy(bytes).into_owned(),
            ));
        })
    }

    /// Random non-zero id not used by any queued packet.
    fn generate_packet_id(&self) -> u32 {
        loop {
            let id = random_nonzero();
            if !self.queue.contains(id) {
                return id;
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn random_nonzero() -> u32 {
    loop {
        let value = rand::random::<u32>();
        if value != 0 {
            return value;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_frame;
    use crate::schema::{XModemControl, from_radio, to_radio};
    use crate::transport::MockTransport;

    fn session(transport: &Arc<MockTransport>, config: SessionConfig) -> Arc<DeviceSession> {
        Arc::new(DeviceSession::new(transport.clone(), config))
    }

    fn envelope(variant: from_radio::PayloadVariant) -> Vec<u8> {
        FromRadio {
            id: 0,
            payload_variant: Some(variant),
        }
        .encode_to_vec()
    }

    fn status_changes(events: &mut broadcast::Receiver<DeviceEvent>) -> Vec<DeviceStatus> {
        std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|event| match event {
                DeviceEvent::StatusChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_config_roundtrip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        let config = SessionConfig {
            config_id: Some(42),
            debug_console: true,
            heartbeat_interval_secs: Some(300),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = SessionConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_defaults_fill_missing_keys() {
        let config: SessionConfig = toml::from_str("pacing_ms = 50").unwrap();
        assert_eq!(config.pacing(), Duration::from_millis(50));
        assert_eq!(config.packet_timeout(), DEFAULT_PACKET_TIMEOUT);
        assert_eq!(config.xmodem_reply_delay(), DEFAULT_XMODEM_REPLY_DELAY);
        assert_eq!(config.heartbeat_interval(), None);
        assert!(SessionConfig::load_from_file("/nonexistent/meshwire.toml").is_err());
    }

    #[test]
    fn test_config_id_random_and_nonzero() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport, SessionConfig::default());
        assert_ne!(session.config_id(), 0);
        assert_eq!(session.status(), DeviceStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_raw_rejects_oversized() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport, SessionConfig::default());

        let err = session
            .send_raw(vec![0; MAX_TO_RADIO_SIZE + 1], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TooLarge { len: 513, max: 512 }));
        assert_eq!(session.queued_packets(), 0);

        session.send_raw(vec![0; MAX_TO_RADIO_SIZE], Some(5)).await.unwrap();
        assert_eq!(transport.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_sends_want_config() {
        let transport = Arc::new(MockTransport::new());
        let config = SessionConfig {
            config_id: Some(42),
            ..Default::default()
        };
        let session = session(&transport, config);

        let mut events = session.subscribe();

        session.connect().await.unwrap();
        assert_eq!(session.status(), DeviceStatus::Configuring);
        assert_eq!(transport.sent_envelopes(), vec![ToRadio::want_config(42)]);
        assert_eq!(
            status_changes(&mut events),
            vec![
                DeviceStatus::Connecting,
                DeviceStatus::Connected,
                DeviceStatus::Configuring,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_disconnect_keeps_status() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport, SessionConfig::default());
        session.connect().await.unwrap();
        session.disconnect().await.unwrap();
        transport.clear_writes();
        let mut events = session.subscribe();

        assert!(matches!(
            session.connect().await,
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            session.configure().await,
            Err(SessionError::NotConnected)
        ));
        assert_eq!(session.status(), DeviceStatus::Disconnected);
        assert!(status_changes(&mut events).is_empty());
        assert!(transport.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_moves_to_reconnecting() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport, SessionConfig::default());
        session.connect().await.unwrap();
        let mut events = session.subscribe();
        let runner = tokio::spawn({
            let session = session.clone();
            async move { session.run().await }
        });

        tokio::task::yield_now().await;
        transport.fail();

        let result = runner.await.unwrap();
        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::ReadFailed(_)))
        ));
        assert_eq!(session.status(), DeviceStatus::Reconnecting);
        assert_eq!(
            status_changes(&mut events).last(),
            Some(&DeviceStatus::Reconnecting)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_moves_to_reconnecting() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport, SessionConfig::default());
        session.update_device_status(DeviceStatus::Connected);
        transport.fail();

        let err = session.heartbeat().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Disconnected)
        ));
        assert_eq!(session.status(), DeviceStatus::Reconnecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_framing_and_console_events() {
        let transport = Arc::new(MockTransport::with_framing(Framing::Stream));
        let config = SessionConfig {
            config_id: Some(9),
            debug_console: true,
            ..Default::default()
        };
        let session = session(&transport, config);
        let mut events = session.subscribe();
        let runner = tokio::spawn({
            let session = session.clone();
            async move { session.run().await }
        });

        let frame = encode_frame(&envelope(from_radio::PayloadVariant::ConfigCompleteId(9))).unwrap();
        let mut stream = b"INFO | booting\n".to_vec();
        stream.extend_from_slice(&frame[..3]);
        transport.push_inbound(stream);
        transport.push_inbound(frame[3..].to_vec());
        transport.close_inbound();

        runner.await.unwrap().unwrap();
        assert_eq!(session.status(), DeviceStatus::Disconnected);

        let mut console = None;
        let mut configured = false;
        while let Ok(event) = events.try_recv() {
            match event {
                DeviceEvent::ConsoleText(text) => console = Some(text),
                DeviceEvent::StatusChanged {
                    to: DeviceStatus::Configured,
                    ..
                } => configured = true,
                _ => {}
            }
        }
        assert_eq!(console.as_deref(), Some("INFO | booting\n"));
        assert!(configured);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebooted_restarts_handshake() {
        let transport = Arc::new(MockTransport::new());
        let config = SessionConfig {
            config_id: Some(3),
            ..Default::default()
        };
        let session = session(&transport, config);
        session.update_device_status(DeviceStatus::Configured);
        let mut events = session.subscribe();

        session
            .handle_inbound(&envelope(from_radio::PayloadVariant::Rebooted(true)))
            .await
            .unwrap();
        assert_eq!(session.status(), DeviceStatus::Configuring);
        assert_eq!(
            status_changes(&mut events),
            vec![DeviceStatus::Restarting, DeviceStatus::Configuring]
        );
        assert_eq!(transport.sent_envelopes(), vec![ToRadio::want_config(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_frame_is_an_error() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport, SessionConfig::default());
        let err = session.handle_inbound(&[0xFF, 0xFF]).await.unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_xmodem_reply_is_delayed() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport, SessionConfig::default());

        let chunk = crate::schema::XModem {
            control: XModemControl::Soh as i32,
            seq: 4,
            crc16: u32::from(crate::xmodem::crc16_ccitt(b"data")),
            buffer: b"data".to_vec(),
        };
        let start = Instant::now();
        session
            .handle_inbound(&envelope(from_radio::PayloadVariant::XmodemPacket(chunk)))
            .await
            .unwrap();
        assert!(start.elapsed() >= DEFAULT_XMODEM_REPLY_DELAY + DEFAULT_PACING);

        let sent = transport.sent_envelopes();
        assert!(matches!(
            &sent[0].payload_variant,
            Some(to_radio::PayloadVariant::XmodemPacket(p))
                if p.control == XModemControl::Ack as i32 && p.seq == 4
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_everything() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport, SessionConfig::default());
        let runner = tokio::spawn({
            let session = session.clone();
            async move { session.run().await }
        });

        session.update_device_status(DeviceStatus::Configured);
        let pending = session.send_raw(vec![1, 2, 3], Some(77)).await.unwrap();
        session.upload_file("x.bin", &[0u8; 300]).await.unwrap();

        session.disconnect().await.unwrap();

        assert_eq!(pending.await, Err(QueueError::Cancelled(77)));
        assert_eq!(session.queued_packets(), 0);
        assert_eq!(session.status(), DeviceStatus::Disconnected);
        assert!(!session.is_uploading());
        runner.await.unwrap().unwrap();

        assert!(matches!(
            session.heartbeat().await,
            Err(SessionError::NotConnected)
        ));
    }
}
