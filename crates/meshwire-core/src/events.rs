//! Event bus for everything the device tells us.
//!
//! Each inbound payload kind becomes one [`DeviceEvent`] variant. Consumers
//! either subscribe to the broadcast stream or register a [`DeviceObserver`]
//! that is called synchronously on every emit.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::protocol::constants::BROADCAST_NUM;
use crate::schema::{
    Channel, Config, DeviceMetadata, FromRadio, LogRecord, MeshPacket, ModuleConfig, MyNodeInfo,
    NeighborInfo, NodeInfo, Paxcount, Position, QueueStatus, RouteDiscovery, Routing, Telemetry,
    User, Waypoint, log_record,
};
use crate::state::DeviceStatus;

/// Whether a packet was addressed to everyone or to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Broadcast,
    Direct,
}

/// Routing header shared by all packet-derived events.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketMeta {
    pub id: u32,
    pub rx_time: DateTime<Utc>,
    pub kind: PacketKind,
    pub from: u32,
    pub to: u32,
    pub channel: u32,
}

impl PacketMeta {
    pub fn from_packet(packet: &MeshPacket) -> Self {
        let rx_time = match packet.rx_time {
            0 => Utc::now(),
            secs => DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_else(Utc::now),
        };
        Self {
            id: packet.id,
            rx_time,
            kind: if packet.to == BROADCAST_NUM {
                PacketKind::Broadcast
            } else {
                PacketKind::Direct
            },
            from: packet.from,
            to: packet.to,
            channel: packet.channel,
        }
    }

    /// Header for payloads that did not arrive inside a mesh packet.
    pub fn local(node: u32) -> Self {
        Self {
            id: 0,
            rx_time: Utc::now(),
            kind: PacketKind::Direct,
            from: node,
            to: node,
            channel: 0,
        }
    }
}

/// A decoded payload together with the packet it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet<T> {
    pub meta: PacketMeta,
    pub data: T,
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// Every decoded envelope, before it is dispatched.
    FromRadio(FromRadio),
    StatusChanged {
        from: DeviceStatus,
        to: DeviceStatus,
    },
    MeshPacket(MeshPacket),
    /// A packet arrived from a node other than ourselves.
    MeshHeartbeat {
        from: u32,
        at: DateTime<Utc>,
    },
    MyNodeInfo(MyNodeInfo),
    NodeInfo(NodeInfo),
    User(Packet<User>),
    Position(Packet<Position>),
    Message(Packet<String>),
    Waypoint(Packet<Waypoint>),
    Routing(Packet<Routing>),
    TraceRoute(Packet<RouteDiscovery>),
    Telemetry(Packet<Telemetry>),
    NeighborInfo(Packet<NeighborInfo>),
    Paxcounter(Packet<Paxcount>),
    DetectionSensor(Packet<String>),
    RangeTest(Packet<String>),
    /// Payload for a port without a dedicated decoder, passed through raw.
    App {
        portnum: i32,
        packet: Packet<Vec<u8>>,
    },
    Config(Config),
    ModuleConfig(ModuleConfig),
    Channel(Channel),
    LogRecord(LogRecord),
    QueueStatus(QueueStatus),
    DeviceMetadata(Packet<DeviceMetadata>),
    /// Device console output interleaved with frames on a stream link.
    ConsoleText(String),
    PendingSettingsChange(bool),
    FileReceived {
        data: Vec<u8>,
    },
}

impl DeviceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceEvent::FromRadio(_) => "from_radio",
            DeviceEvent::StatusChanged { .. } => "status_changed",
            DeviceEvent::MeshPacket(_) => "mesh_packet",
            DeviceEvent::MeshHeartbeat { .. } => "mesh_heartbeat",
            DeviceEvent::MyNodeInfo(_) => "my_node_info",
            DeviceEvent::NodeInfo(_) => "node_info",
            DeviceEvent::User(_) => "user",
            DeviceEvent::Position(_) => "position",
            DeviceEvent::Message(_) => "message",
            DeviceEvent::Waypoint(_) => "waypoint",
            DeviceEvent::Routing(_) => "routing",
            DeviceEvent::TraceRoute(_) => "trace_route",
            DeviceEvent::Telemetry(_) => "telemetry",
            DeviceEvent::NeighborInfo(_) => "neighbor_info",
            DeviceEvent::Paxcounter(_) => "paxcounter",
            DeviceEvent::DetectionSensor(_) => "detection_sensor",
            DeviceEvent::RangeTest(_) => "range_test",
            DeviceEvent::App { .. } => "app",
            DeviceEvent::Config(_) => "config",
            DeviceEvent::ModuleConfig(_) => "module_config",
            DeviceEvent::Channel(_) => "channel",
            DeviceEvent::LogRecord(_) => "log_record",
            DeviceEvent::QueueStatus(_) => "queue_status",
            DeviceEvent::DeviceMetadata(_) => "device_metadata",
            DeviceEvent::ConsoleText(_) => "console_text",
            DeviceEvent::PendingSettingsChange(_) => "pending_settings_change",
            DeviceEvent::FileReceived { .. } => "file_received",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Broadcast => write!(f, "broadcast"),
            PacketKind::Direct => write!(f, "direct"),
        }
    }
}

/// Observer trait for receiving device events.
///
/// Called synchronously from the session's read loop; implementations must
/// not block and must not call back into the session.
pub trait DeviceObserver: Send + Sync {
    fn on_event(&self, event: &DeviceEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DeviceObserver for NullObserver {
    fn on_event(&self, _event: &DeviceEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DeviceObserver for TracingObserver {
    fn on_event(&self, event: &DeviceEvent) {
        match event {
            DeviceEvent::StatusChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Device status changed");
            }
            DeviceEvent::Message(packet) => {
                tracing::info!(
                    from = %format!("!{:08x}", packet.meta.from),
                    kind = %packet.meta.kind,
                    channel = packet.meta.channel,
                    "Message: {}",
                    packet.data
                );
            }
            DeviceEvent::LogRecord(record) => {
                let source = record.source.as_str();
                match log_record::Level::try_from(record.level) {
                    Ok(log_record::Level::Critical | log_record::Level::Error) => {
                        tracing::error!(source, "Device: {}", record.message)
                    }
                    Ok(log_record::Level::Warning) => {
                        tracing::warn!(source, "Device: {}", record.message)
                    }
                    Ok(log_record::Level::Info) => {
                        tracing::info!(source, "Device: {}", record.message)
                    }
                    _ => tracing::debug!(source, "Device: {}", record.message),
                }
            }
            DeviceEvent::ConsoleText(text) => {
                tracing::debug!(target: "meshwire::console", "{}", text.trim_end());
            }
            DeviceEvent::FileReceived { data } => {
                tracing::info!(bytes = data.len(), "File received");
            }
            DeviceEvent::PendingSettingsChange(pending) => {
                tracing::debug!(pending, "Settings transaction");
            }
            DeviceEvent::MeshPacket(packet) => {
                tracing::trace!(
                    id = packet.id,
                    from = %format!("!{:08x}", packet.from),
                    to = %format!("!{:08x}", packet.to),
                    "Mesh packet"
                );
            }
            DeviceEvent::FromRadio(_) | DeviceEvent::MeshHeartbeat { .. } => {}
            other => {
                tracing::debug!(kind = other.kind(), "Device event");
            }
        }
    }
}

struct BusInner {
    tx: broadcast::Sender<DeviceEvent>,
    observers: RwLock<Vec<Arc<dyn DeviceObserver>>>,
}

/// Fan-out point for [`DeviceEvent`]s. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// missing events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                tx,
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.tx.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn DeviceObserver>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn emit(&self, event: DeviceEvent) {
        for observer in self
            .inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            observer.on_event(&event);
        }
        // No subscribers is not an error.
        let _ = self.inner.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl DeviceObserver for Recorder {
        fn on_event(&self, event: &DeviceEvent) {
            self.0.lock().unwrap().push(event.kind());
        }
    }

    #[test]
    fn test_emit_reaches_observers_and_subscribers() {
        let bus = EventBus::new(8);
        let recorder = Arc::new(Recorder::default());
        bus.add_observer(recorder.clone());
        bus.add_observer(Arc::new(NullObserver));
        let mut rx = bus.subscribe();

        bus.emit(DeviceEvent::PendingSettingsChange(true));
        bus.emit(DeviceEvent::ConsoleText("boot\n".into()));

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["pending_settings_change", "console_text"]
        );
        assert!(matches!(
            rx.try_recv(),
            Ok(DeviceEvent::PendingSettingsChange(true))
        ));
        assert!(matches!(rx.try_recv(), Ok(DeviceEvent::ConsoleText(_))));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.add_observer(Arc::new(TracingObserver));
        bus.emit(DeviceEvent::FileReceived { data: vec![1, 2] });
    }

    #[test]
    fn test_packet_meta() {
        let packet = MeshPacket {
            from: 1,
            to: BROADCAST_NUM,
            id: 77,
            channel: 2,
            rx_time: 1_700_000_000,
            ..Default::default()
        };
        let meta = PacketMeta::from_packet(&packet);
        assert_eq!(meta.kind, PacketKind::Broadcast);
        assert_eq!(meta.rx_time.timestamp(), 1_700_000_000);
        assert_eq!((meta.id, meta.from, meta.channel), (77, 1, 2));

        let direct = PacketMeta::from_packet(&MeshPacket {
            to: 5,
            ..Default::default()
        });
        assert_eq!(direct.kind, PacketKind::Direct);

        let local = PacketMeta::local(9);
        assert_eq!((local.from, local.to, local.channel), (9, 9, 0));
    }
}
