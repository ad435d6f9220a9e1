//! Inbound dispatch - one handler per `FromRadio` payload kind.
//!
//! This module is split into submodules by payload family:
//! - `packet`: mesh packets, demultiplexed by port number
//! - `admin`: admin-port responses
//!
//! Handlers are synchronous: they mutate [`SessionState`], emit events and
//! feed the send queue and transfer state. Anything that needs to go back
//! out on the link is returned as a [`HandleResult`] for the session to send.

mod admin;
mod packet;

use tracing::{debug, error, info, warn};

use crate::events::{DeviceEvent, EventBus, Packet, PacketMeta};
use crate::protocol::constants::{MIN_FIRMWARE_VERSION, QUEUE_LOW_WATERMARK};
use crate::queue::SendQueue;
use crate::schema::{DeviceMetadata, FromRadio, XModem, from_radio};
use crate::state::machine::{DeviceStatus, SessionState};
use crate::xmodem::{XModemAction, XModemTransfer};

pub use packet::handle_mesh_packet;

/// Result of handling an inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleResult {
    /// Nothing to send.
    Continue,
    /// The device rebooted; restart the handshake.
    Reconfigure,
    /// Answer the peer's transfer packet.
    XModemReply(XModem),
}

/// Handler context containing all resources.
pub struct HandlerContext<'a> {
    pub state: &'a mut SessionState,
    pub events: &'a EventBus,
    pub queue: &'a SendQueue,
    pub xmodem: &'a mut XModemTransfer,
}

impl HandlerContext<'_> {
    pub(crate) fn emit(&self, event: DeviceEvent) {
        self.events.emit(event);
    }

    pub(crate) fn set_status(&mut self, status: DeviceStatus) {
        if let Some(previous) = self.state.update_status(status) {
            self.emit(DeviceEvent::StatusChanged {
                from: previous,
                to: status,
            });
        }
    }
}

/// Dispatch one decoded envelope.
pub fn handle_from_radio(message: FromRadio, ctx: &mut HandlerContext<'_>) -> HandleResult {
    ctx.emit(DeviceEvent::FromRadio(message.clone()));

    let Some(variant) = message.payload_variant else {
        warn!(id = message.id, "FromRadio without payload");
        return HandleResult::Continue;
    };

    match variant {
        from_radio::PayloadVariant::Packet(packet) => handle_mesh_packet(packet, ctx),
        from_radio::PayloadVariant::MyInfo(info) => {
            info!(node = %format!("!{:08x}", info.my_node_num), "Received node identity");
            ctx.state.my_node_info = Some(info.clone());
            ctx.emit(DeviceEvent::MyNodeInfo(info));
            HandleResult::Continue
        }
        from_radio::PayloadVariant::NodeInfo(node) => {
            debug!(node = node.num, "Received node info");
            ctx.state.upsert_node(node.clone());
            let meta = PacketMeta::local(node.num);
            if let Some(user) = node.user.clone() {
                ctx.emit(DeviceEvent::User(Packet {
                    meta: meta.clone(),
                    data: user,
                }));
            }
            if let Some(position) = node.position.clone() {
                ctx.emit(DeviceEvent::Position(Packet {
                    meta,
                    data: position,
                }));
            }
            ctx.emit(DeviceEvent::NodeInfo(node));
            HandleResult::Continue
        }
        from_radio::PayloadVariant::Config(config) => {
            ctx.emit(DeviceEvent::Config(config));
            HandleResult::Continue
        }
        from_radio::PayloadVariant::ModuleConfig(config) => {
            ctx.emit(DeviceEvent::ModuleConfig(config));
            HandleResult::Continue
        }
        from_radio::PayloadVariant::Channel(channel) => {
            ctx.emit(DeviceEvent::Channel(channel));
            HandleResult::Continue
        }
        from_radio::PayloadVariant::LogRecord(record) => {
            ctx.emit(DeviceEvent::LogRecord(record));
            HandleResult::Continue
        }
        from_radio::PayloadVariant::ConfigCompleteId(id) => {
            if id != ctx.state.config_id {
                // Mismatch is reported but the handshake still completes.
                error!(
                    expected = ctx.state.config_id,
                    received = id,
                    "Invalid config id received from device"
                );
            }
            info!(config_id = id, "Configuration complete");
            ctx.set_status(DeviceStatus::Configured);
            HandleResult::Continue
        }
        from_radio::PayloadVariant::Rebooted(_) => {
            info!("Device rebooted, restarting handshake");
            ctx.set_status(DeviceStatus::Restarting);
            HandleResult::Reconfigure
        }
        from_radio::PayloadVariant::QueueStatus(status) => {
            if status.free < QUEUE_LOW_WATERMARK {
                warn!(
                    free = status.free,
                    maxlen = status.maxlen,
                    "Device send queue nearly full"
                );
            } else {
                debug!(free = status.free, maxlen = status.maxlen, "Device queue status");
            }
            ctx.emit(DeviceEvent::QueueStatus(status));
            HandleResult::Continue
        }
        from_radio::PayloadVariant::XmodemPacket(packet) => {
            match ctx.xmodem.handle_packet(&packet) {
                XModemAction::None => HandleResult::Continue,
                XModemAction::Send(reply) => HandleResult::XModemReply(reply),
                XModemAction::Complete(data) => {
                    ctx.emit(DeviceEvent::FileReceived { data });
                    HandleResult::Continue
                }
            }
        }
        from_radio::PayloadVariant::Metadata(metadata) => {
            check_firmware(&metadata);
            ctx.state.metadata = Some(metadata.clone());
            ctx.emit(DeviceEvent::DeviceMetadata(Packet {
                meta: PacketMeta::local(0),
                data: metadata,
            }));
            HandleResult::Continue
        }
    }
}

fn check_firmware(metadata: &DeviceMetadata) {
    match metadata.firmware_major_minor() {
        Some(version) if version < MIN_FIRMWARE_VERSION => {
            error!(
                firmware = %metadata.firmware_version,
                "Device firmware outdated, update to {}.{} or newer",
                MIN_FIRMWARE_VERSION.0,
                MIN_FIRMWARE_VERSION.1
            );
        }
        Some(_) => debug!(firmware = %metadata.firmware_version, "Device firmware"),
        None => warn!(firmware = %metadata.firmware_version, "Unparseable firmware version"),
    }
}
