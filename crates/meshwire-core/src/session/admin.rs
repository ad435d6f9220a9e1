//! Admin operations and the edit-settings transaction.
//!
//! Writes to config, module config, owner and channels are grouped into a
//! transaction on the device: the first write opens it with
//! `beginEditSettings`, later writes join it, and `commitEditSettings` applies
//! everything at once. The device reverts an uncommitted transaction on its
//! own; the session only mirrors the open/closed flag.

use tracing::info;

use super::packets::{Destination, PacketOptions};
use super::{DeviceSession, SessionError, lock};
use crate::events::DeviceEvent;
use crate::queue::PendingPacket;
use crate::schema::{
    AdminMessage, AdminPayload, Channel, Config, ConfigType, ModuleConfig, ModuleConfigType,
    Position, User,
};

impl DeviceSession {
    pub async fn begin_edit_settings(&self) -> Result<PendingPacket, SessionError> {
        self.set_pending_settings(true);
        self.send_begin_edit().await
    }

    pub async fn commit_edit_settings(&self) -> Result<PendingPacket, SessionError> {
        let pending = self
            .send_admin(AdminPayload::CommitEditSettings(true), Destination::Local, false)
            .await?;
        self.set_pending_settings(false);
        Ok(pending)
    }

    pub async fn set_config(&self, config: Config) -> Result<PendingPacket, SessionError> {
        self.send_setting(AdminPayload::SetConfig(config)).await
    }

    pub async fn set_module_config(
        &self,
        config: ModuleConfig,
    ) -> Result<PendingPacket, SessionError> {
        self.send_setting(AdminPayload::SetModuleConfig(config))
            .await
    }

    pub async fn set_owner(&self, owner: User) -> Result<PendingPacket, SessionError> {
        self.send_setting(AdminPayload::SetOwner(owner)).await
    }

    pub async fn set_channel(&self, channel: Channel) -> Result<PendingPacket, SessionError> {
        self.send_setting(AdminPayload::SetChannel(channel)).await
    }

    /// Disable the channel at `index`.
    pub async fn clear_channel(&self, index: i32) -> Result<PendingPacket, SessionError> {
        self.set_channel(Channel::disabled(index)).await
    }

    /// Channel indices are zero-based here; the device numbers them from one.
    pub async fn get_channel(&self, index: u32) -> Result<PendingPacket, SessionError> {
        self.send_request(AdminPayload::GetChannelRequest(index + 1), Destination::Local)
            .await
    }

    pub async fn get_owner(&self) -> Result<PendingPacket, SessionError> {
        self.send_request(AdminPayload::GetOwnerRequest(true), Destination::Local)
            .await
    }

    pub async fn get_config(&self, section: ConfigType) -> Result<PendingPacket, SessionError> {
        self.send_request(
            AdminPayload::GetConfigRequest(section as i32),
            Destination::Local,
        )
        .await
    }

    pub async fn get_module_config(
        &self,
        section: ModuleConfigType,
    ) -> Result<PendingPacket, SessionError> {
        self.send_request(
            AdminPayload::GetModuleConfigRequest(section as i32),
            Destination::Local,
        )
        .await
    }

    /// Ask `node` (possibly remote) for its device metadata.
    pub async fn get_metadata(&self, node: u32) -> Result<PendingPacket, SessionError> {
        self.send_request(
            AdminPayload::GetDeviceMetadataRequest(true),
            Destination::Node(node),
        )
        .await
    }

    pub async fn set_fixed_position(
        &self,
        position: Position,
    ) -> Result<PendingPacket, SessionError> {
        self.send_command(AdminPayload::SetFixedPosition(position))
            .await
    }

    pub async fn remove_fixed_position(&self) -> Result<PendingPacket, SessionError> {
        self.send_command(AdminPayload::RemoveFixedPosition(true))
            .await
    }

    pub async fn set_canned_messages(&self, messages: &str) -> Result<PendingPacket, SessionError> {
        self.send_command(AdminPayload::SetCannedMessageModuleMessages(
            messages.to_string(),
        ))
        .await
    }

    /// Remove `num` from the device's node database and the local table.
    pub async fn remove_node(&self, num: u32) -> Result<PendingPacket, SessionError> {
        let pending = self
            .send_command(AdminPayload::RemoveByNodenum(num))
            .await?;
        lock(&self.state).nodes.remove(&num);
        Ok(pending)
    }

    /// Wipe the device's node database.
    pub async fn reset_nodes(&self) -> Result<PendingPacket, SessionError> {
        let pending = self.send_command(AdminPayload::NodedbReset(1)).await?;
        lock(&self.state).nodes.clear();
        Ok(pending)
    }

    pub async fn shutdown(&self, seconds: i32) -> Result<PendingPacket, SessionError> {
        info!(seconds, "Requesting device shutdown");
        self.send_command(AdminPayload::ShutdownSeconds(seconds))
            .await
    }

    pub async fn reboot(&self, seconds: i32) -> Result<PendingPacket, SessionError> {
        info!(seconds, "Requesting device reboot");
        self.send_command(AdminPayload::RebootSeconds(seconds)).await
    }

    pub async fn reboot_ota(&self, seconds: i32) -> Result<PendingPacket, SessionError> {
        info!(seconds, "Requesting reboot into OTA mode");
        self.send_command(AdminPayload::RebootOtaSeconds(seconds))
            .await
    }

    pub async fn enter_dfu_mode(&self) -> Result<PendingPacket, SessionError> {
        self.send_command(AdminPayload::EnterDfuModeRequest(true))
            .await
    }

    pub async fn factory_reset_device(&self) -> Result<PendingPacket, SessionError> {
        info!("Requesting full factory reset");
        self.send_command(AdminPayload::FactoryResetDevice(1)).await
    }

    pub async fn factory_reset_config(&self) -> Result<PendingPacket, SessionError> {
        info!("Requesting configuration factory reset");
        self.send_command(AdminPayload::FactoryResetConfig(1)).await
    }

    /// Settings writes open a transaction first when none is pending.
    async fn send_setting(&self, payload: AdminPayload) -> Result<PendingPacket, SessionError> {
        if self.claim_transaction() {
            self.send_begin_edit().await?;
        }
        self.send_command(payload).await
    }

    /// Mark a transaction open if none is. Returns true for the caller that
    /// opened it, which then owes the device a `beginEditSettings`.
    fn claim_transaction(&self) -> bool {
        let opened = {
            let mut state = lock(&self.state);
            !std::mem::replace(&mut state.pending_settings_change, true)
        };
        if opened {
            info!(pending = true, "Settings transaction");
            self.events.emit(DeviceEvent::PendingSettingsChange(true));
        }
        opened
    }

    /// The flag is already set; a failed send closes it again.
    async fn send_begin_edit(&self) -> Result<PendingPacket, SessionError> {
        let sent = self
            .send_admin(AdminPayload::BeginEditSettings(true), Destination::Local, false)
            .await;
        if sent.is_err() {
            self.set_pending_settings(false);
        }
        sent
    }

    async fn send_command(&self, payload: AdminPayload) -> Result<PendingPacket, SessionError> {
        self.send_admin(payload, Destination::Local, false).await
    }

    async fn send_request(
        &self,
        payload: AdminPayload,
        destination: Destination,
    ) -> Result<PendingPacket, SessionError> {
        self.send_admin(payload, destination, true).await
    }

    async fn send_admin(
        &self,
        payload: AdminPayload,
        destination: Destination,
        want_response: bool,
    ) -> Result<PendingPacket, SessionError> {
        let options = PacketOptions {
            destination,
            want_response,
            ..Default::default()
        };
        self.send_data(AdminMessage::new(payload).into_data(), options)
            .await
    }

    fn set_pending_settings(&self, pending: bool) {
        lock(&self.state).pending_settings_change = pending;
        info!(pending, "Settings transaction");
        self.events.emit(DeviceEvent::PendingSettingsChange(pending));
    }
}
