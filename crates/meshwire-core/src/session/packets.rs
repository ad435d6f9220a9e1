//! Outbound mesh packets.

use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use tracing::debug;

use super::{DeviceSession, SessionError};
use crate::protocol::constants::BROADCAST_NUM;
use crate::queue::PendingPacket;
use crate::schema::{
    Data, MeshPacket, PortNum, Position, RouteDiscovery, ToRadio, Waypoint, mesh_packet,
};
use crate::state::handle_mesh_packet;

/// Where a packet is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    #[default]
    Broadcast,
    /// The node this session is connected to.
    Local,
    Node(u32),
}

/// Per-packet send options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOptions {
    pub destination: Destination,
    pub channel: u32,
    pub want_ack: bool,
    pub want_response: bool,
    /// Also dispatch the packet locally, as if it had been received.
    pub echo_response: bool,
    pub reply_id: Option<u32>,
    pub emoji: Option<u32>,
}

impl Default for PacketOptions {
    fn default() -> Self {
        Self {
            destination: Destination::Broadcast,
            channel: 0,
            want_ack: true,
            want_response: false,
            echo_response: false,
            reply_id: None,
            emoji: None,
        }
    }
}

impl PacketOptions {
    pub fn to(destination: Destination) -> Self {
        Self {
            destination,
            ..Default::default()
        }
    }

    pub fn with_response(mut self) -> Self {
        self.want_response = true;
        self
    }

    pub fn on_channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }
}

impl DeviceSession {
    /// Send `payload` on `port`. Resolves when the device reports delivery.
    pub async fn send_packet(
        &self,
        payload: Vec<u8>,
        port: PortNum,
        options: PacketOptions,
    ) -> Result<PendingPacket, SessionError> {
        let data = Data {
            portnum: port as i32,
            payload,
            ..Default::default()
        };
        self.send_data(data, options).await
    }

    pub async fn send_text(
        &self,
        text: &str,
        options: PacketOptions,
    ) -> Result<PendingPacket, SessionError> {
        self.send_packet(text.as_bytes().to_vec(), PortNum::TextMessageApp, options)
            .await
    }

    pub async fn send_waypoint(
        &self,
        waypoint: Waypoint,
        options: PacketOptions,
    ) -> Result<PendingPacket, SessionError> {
        self.send_packet(waypoint.encode_to_vec(), PortNum::WaypointApp, options)
            .await
    }

    /// Report our own position to the connected node.
    pub async fn set_position(&self, position: Position) -> Result<PendingPacket, SessionError> {
        self.send_packet(
            position.encode_to_vec(),
            PortNum::PositionApp,
            PacketOptions::to(Destination::Local),
        )
        .await
    }

    /// Ask `node` for the route to it. The answer arrives as a trace-route event.
    pub async fn trace_route(&self, node: u32) -> Result<PendingPacket, SessionError> {
        self.send_packet(
            RouteDiscovery::default().encode_to_vec(),
            PortNum::TracerouteApp,
            PacketOptions::to(Destination::Node(node)).with_response(),
        )
        .await
    }

    pub async fn request_position(&self, node: u32) -> Result<PendingPacket, SessionError> {
        self.send_packet(
            Position::default().encode_to_vec(),
            PortNum::PositionApp,
            PacketOptions::to(Destination::Node(node)).with_response(),
        )
        .await
    }

    pub(super) async fn send_data(
        &self,
        mut data: Data,
        options: PacketOptions,
    ) -> Result<PendingPacket, SessionError> {
        data.want_response = options.want_response;
        data.reply_id = options.reply_id.unwrap_or(0);
        data.emoji = options.emoji.unwrap_or(0);

        let id = self.generate_packet_id();
        let packet = MeshPacket {
            from: self.my_node_num(),
            to: self.resolve(options.destination),
            channel: options.channel,
            id,
            want_ack: options.want_ack,
            payload_variant: Some(mesh_packet::PayloadVariant::Decoded(data)),
            ..Default::default()
        };
        debug!(id, to = packet.to, channel = packet.channel, "Sending packet");

        if options.echo_response {
            let mut echo = packet.clone();
            echo.rx_time = unix_now();
            let result = self.dispatch(|ctx| handle_mesh_packet(echo, ctx));
            self.apply(result).await?;
        }

        self.send_raw(ToRadio::packet(packet).encode_to_vec(), Some(id))
            .await
    }

    fn resolve(&self, destination: Destination) -> u32 {
        match destination {
            Destination::Broadcast => BROADCAST_NUM,
            Destination::Local => self.my_node_num(),
            Destination::Node(num) => num,
        }
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DeviceEvent;
    use crate::schema::{FromRadio, MyNodeInfo, from_radio, to_radio};
    use crate::session::SessionConfig;
    use crate::transport::MockTransport;
    use std::sync::Arc;

    async fn session_with_node(num: u32) -> (Arc<MockTransport>, DeviceSession) {
        let transport = Arc::new(MockTransport::new());
        let session = DeviceSession::new(transport.clone(), SessionConfig::default());
        let info = FromRadio {
            id: 0,
            payload_variant: Some(from_radio::PayloadVariant::MyInfo(MyNodeInfo {
                my_node_num: num,
                ..Default::default()
            })),
        };
        session.handle_inbound(&info.encode_to_vec()).await.unwrap();
        (transport, session)
    }

    fn sent_packets(transport: &MockTransport) -> Vec<MeshPacket> {
        transport
            .sent_envelopes()
            .into_iter()
            .filter_map(|envelope| match envelope.payload_variant {
                Some(to_radio::PayloadVariant::Packet(packet)) => Some(packet),
                _ => None,
            })
            .collect()
    }

    fn decoded(packet: &MeshPacket) -> &Data {
        match &packet.payload_variant {
            Some(mesh_packet::PayloadVariant::Decoded(data)) => data,
            other => panic!("expected decoded payload, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_defaults_to_broadcast() {
        let (transport, session) = session_with_node(0x10).await;
        let pending = session
            .send_text("hello mesh", PacketOptions::default())
            .await
            .unwrap();

        let packets = sent_packets(&transport);
        assert_eq!(packets.len(), 1);
        let packet = &packets[0];
        assert_eq!(packet.id, pending.id());
        assert_ne!(packet.id, 0);
        assert_eq!((packet.from, packet.to), (0x10, BROADCAST_NUM));
        assert!(packet.want_ack);
        let data = decoded(packet);
        assert_eq!(data.portnum, PortNum::TextMessageApp as i32);
        assert_eq!(data.payload, b"hello mesh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_ack_resolves_send() {
        let (_transport, session) = session_with_node(0x10).await;
        let pending = session
            .send_text("ping", PacketOptions::to(Destination::Node(0x20)))
            .await
            .unwrap();
        let id = pending.id();

        let routing = crate::schema::Routing {
            variant: Some(crate::schema::routing::Variant::ErrorReason(0)),
        };
        let ack = FromRadio {
            id: 0,
            payload_variant: Some(from_radio::PayloadVariant::Packet(MeshPacket {
                from: 0x20,
                to: 0x10,
                payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
                    portnum: PortNum::RoutingApp as i32,
                    payload: routing.encode_to_vec(),
                    request_id: id,
                    ..Default::default()
                })),
                ..Default::default()
            })),
        };
        session.handle_inbound(&ack.encode_to_vec()).await.unwrap();
        assert_eq!(pending.await, Ok(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_destination_and_response_flags() {
        let (transport, session) = session_with_node(0x10).await;
        session.trace_route(0x30).await.unwrap();
        session
            .set_position(Position {
                latitude_i: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();

        let packets = sent_packets(&transport);
        assert_eq!(packets[0].to, 0x30);
        assert_eq!(decoded(&packets[0]).portnum, PortNum::TracerouteApp as i32);
        assert!(decoded(&packets[0]).want_response);
        assert_eq!(packets[1].to, 0x10);
        assert!(!decoded(&packets[1]).want_response);
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_response_dispatches_locally() {
        let (_transport, session) = session_with_node(0x10).await;
        let mut events = session.subscribe();

        let options = PacketOptions {
            echo_response: true,
            reply_id: Some(99),
            ..Default::default()
        };
        session.send_text("echo", options).await.unwrap();

        let mut echoed = None;
        while let Ok(event) = events.try_recv() {
            if let DeviceEvent::Message(packet) = event {
                echoed = Some(packet);
            }
        }
        let echoed = echoed.expect("echo should be dispatched");
        assert_eq!(echoed.data, "echo");
        assert_eq!(echoed.meta.from, 0x10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_text_rejected() {
        let (transport, session) = session_with_node(1).await;
        let err = session
            .send_text(&"x".repeat(600), PacketOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TooLarge { .. }));
        assert!(transport.writes().is_empty());
    }
}
