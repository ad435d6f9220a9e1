//! Mesh packets, demultiplexed by port number.

use chrono::Utc;
use prost::Message;
use tracing::{debug, trace, warn};

use crate::events::{DeviceEvent, Packet, PacketMeta};
use crate::schema::{
    AdminMessage, Data, MeshPacket, NeighborInfo, Paxcount, PortNum, Position, RouteDiscovery,
    Routing, RoutingError, Telemetry, User, Waypoint, mesh_packet, routing,
};

use super::{HandleResult, HandlerContext, admin};

pub fn handle_mesh_packet(packet: MeshPacket, ctx: &mut HandlerContext<'_>) -> HandleResult {
    ctx.emit(DeviceEvent::MeshPacket(packet.clone()));

    if packet.from != ctx.state.my_node_num() {
        ctx.emit(DeviceEvent::MeshHeartbeat {
            from: packet.from,
            at: Utc::now(),
        });
    }

    match &packet.payload_variant {
        Some(mesh_packet::PayloadVariant::Decoded(data)) => handle_decoded(&packet, data, ctx),
        Some(mesh_packet::PayloadVariant::Encrypted(_)) => {
            debug!(id = packet.id, "Encrypted packet, ignoring");
        }
        None => warn!(id = packet.id, "Mesh packet without payload"),
    }
    HandleResult::Continue
}

fn handle_decoded(packet: &MeshPacket, data: &Data, ctx: &mut HandlerContext<'_>) {
    let meta = PacketMeta::from_packet(packet);

    let Ok(port) = PortNum::try_from(data.portnum) else {
        debug!(portnum = data.portnum, "Unknown port, passing through");
        emit_raw(data, meta, ctx);
        return;
    };
    trace!(id = meta.id, ?port, "Decoded packet");

    match port {
        PortNum::TextMessageApp => {
            let text = String::from_utf8_lossy(&data.payload).into_owned();
            ctx.emit(DeviceEvent::Message(Packet { meta, data: text }));
        }
        PortNum::PositionApp => {
            if let Some(position) = decode::<Position>(data, port) {
                ctx.state.update_position(meta.from, position.clone());
                ctx.emit(DeviceEvent::Position(Packet {
                    meta,
                    data: position,
                }));
            }
        }
        PortNum::NodeinfoApp => {
            if let Some(user) = decode::<User>(data, port) {
                ctx.state.update_user(meta.from, user.clone());
                ctx.emit(DeviceEvent::User(Packet { meta, data: user }));
            }
        }
        PortNum::RoutingApp => {
            if let Some(routing) = decode::<Routing>(data, port) {
                handle_routing(data.request_id, &routing, ctx);
                ctx.emit(DeviceEvent::Routing(Packet {
                    meta,
                    data: routing,
                }));
            }
        }
        PortNum::AdminApp => {
            if let Some(message) = decode::<AdminMessage>(data, port) {
                admin::handle_admin_message(meta, message, ctx);
            }
        }
        PortNum::WaypointApp => {
            if let Some(waypoint) = decode::<Waypoint>(data, port) {
                ctx.emit(DeviceEvent::Waypoint(Packet {
                    meta,
                    data: waypoint,
                }));
            }
        }
        PortNum::TelemetryApp => {
            if let Some(telemetry) = decode::<Telemetry>(data, port) {
                ctx.emit(DeviceEvent::Telemetry(Packet {
                    meta,
                    data: telemetry,
                }));
            }
        }
        PortNum::TracerouteApp => {
            if let Some(route) = decode::<RouteDiscovery>(data, port) {
                ctx.emit(DeviceEvent::TraceRoute(Packet { meta, data: route }));
            }
        }
        PortNum::NeighborinfoApp => {
            if let Some(info) = decode::<NeighborInfo>(data, port) {
                ctx.emit(DeviceEvent::NeighborInfo(Packet { meta, data: info }));
            }
        }
        PortNum::PaxcounterApp => {
            if let Some(count) = decode::<Paxcount>(data, port) {
                ctx.emit(DeviceEvent::Paxcounter(Packet { meta, data: count }));
            }
        }
        PortNum::DetectionSensorApp => {
            let text = String::from_utf8_lossy(&data.payload).into_owned();
            ctx.emit(DeviceEvent::DetectionSensor(Packet { meta, data: text }));
        }
        PortNum::RangeTestApp => {
            let text = String::from_utf8_lossy(&data.payload).into_owned();
            ctx.emit(DeviceEvent::RangeTest(Packet { meta, data: text }));
        }
        PortNum::UnknownApp
        | PortNum::RemoteHardwareApp
        | PortNum::TextMessageCompressedApp
        | PortNum::AudioApp
        | PortNum::ReplyApp
        | PortNum::IpTunnelApp
        | PortNum::SerialApp
        | PortNum::StoreForwardApp
        | PortNum::ZpsApp
        | PortNum::SimulatorApp
        | PortNum::AtakPlugin
        | PortNum::MapReportApp
        | PortNum::PrivateApp
        | PortNum::AtakForwarder => emit_raw(data, meta, ctx),
    }
}

/// Routing responses settle the queued packet they refer to.
fn handle_routing(request_id: u32, routing: &Routing, ctx: &HandlerContext<'_>) {
    match &routing.variant {
        Some(routing::Variant::ErrorReason(code)) => match RoutingError::try_from(*code) {
            Ok(RoutingError::None) => {
                ctx.queue.process_ack(request_id);
            }
            Ok(reason) => {
                ctx.queue.process_error(request_id, reason);
            }
            Err(_) => warn!(request_id, code, "Unknown routing error code"),
        },
        Some(routing::Variant::RouteRequest(_) | routing::Variant::RouteReply(_)) => {
            debug!(request_id, "Route discovery response");
        }
        None => {}
    }
}

fn emit_raw(data: &Data, meta: PacketMeta, ctx: &HandlerContext<'_>) {
    ctx.emit(DeviceEvent::App {
        portnum: data.portnum,
        packet: Packet {
            meta,
            data: data.payload.clone(),
        },
    });
}

fn decode<M: Message + Default>(data: &Data, port: PortNum) -> Option<M> {
    match M::decode(data.payload.as_slice()) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(?port, error = %e, "Failed to decode packet payload");
            None
        }
    }
}
