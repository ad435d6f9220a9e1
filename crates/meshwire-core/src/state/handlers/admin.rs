//! Admin-port responses.

use tracing::{debug, error};

use crate::events::{DeviceEvent, Packet, PacketMeta};
use crate::schema::{AdminMessage, AdminPayload};

use super::HandlerContext;

pub fn handle_admin_message(meta: PacketMeta, message: AdminMessage, ctx: &mut HandlerContext<'_>) {
    let Some(payload) = message.payload_variant else {
        debug!(id = meta.id, "Empty admin message");
        return;
    };

    match payload {
        AdminPayload::GetChannelResponse(channel) => {
            ctx.emit(DeviceEvent::Channel(channel));
        }
        AdminPayload::GetOwnerResponse(user) => {
            ctx.state.update_user(meta.from, user.clone());
            ctx.emit(DeviceEvent::User(Packet { meta, data: user }));
        }
        AdminPayload::GetConfigResponse(config) => {
            ctx.emit(DeviceEvent::Config(config));
        }
        AdminPayload::GetModuleConfigResponse(config) => {
            ctx.emit(DeviceEvent::ModuleConfig(config));
        }
        AdminPayload::GetDeviceMetadataResponse(metadata) => {
            ctx.emit(DeviceEvent::DeviceMetadata(Packet {
                meta,
                data: metadata,
            }));
        }
        other => {
            error!(id = meta.id, payload = ?other, "Received unhandled admin payload");
        }
    }
}
