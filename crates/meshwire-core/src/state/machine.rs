//! Connection status and the per-session state the handlers mutate.

use std::collections::HashMap;
use std::fmt;

use crate::schema::{DeviceMetadata, MyNodeInfo, NodeInfo, Position, User};

/// Handshake progress of the device link.
///
/// Normal order is `Disconnected -> Connecting -> Connected -> Configuring ->
/// Configured`; transport failures detour through `Reconnecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DeviceStatus {
    Restarting = 1,
    #[default]
    Disconnected = 2,
    Connecting = 3,
    Reconnecting = 4,
    Connected = 5,
    Configuring = 6,
    Configured = 7,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Restarting => write!(f, "RESTARTING"),
            DeviceStatus::Disconnected => write!(f, "DISCONNECTED"),
            DeviceStatus::Connecting => write!(f, "CONNECTING"),
            DeviceStatus::Reconnecting => write!(f, "RECONNECTING"),
            DeviceStatus::Connected => write!(f, "CONNECTED"),
            DeviceStatus::Configuring => write!(f, "CONFIGURING"),
            DeviceStatus::Configured => write!(f, "CONFIGURED"),
        }
    }
}

impl DeviceStatus {
    /// Link is up, whether or not the handshake finished.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            DeviceStatus::Connected | DeviceStatus::Configuring | DeviceStatus::Configured
        )
    }
}

/// Session state holding everything learned from the device.
#[derive(Debug, Default)]
pub struct SessionState {
    pub status: DeviceStatus,
    /// Handshake correlation token, fixed for the life of the session.
    pub config_id: u32,
    /// A begin-edit transaction is open on the device.
    pub pending_settings_change: bool,
    pub my_node_info: Option<MyNodeInfo>,
    pub metadata: Option<DeviceMetadata>,
    pub nodes: HashMap<u32, NodeInfo>,
}

impl SessionState {
    pub fn new(config_id: u32) -> Self {
        Self {
            config_id,
            ..Default::default()
        }
    }

    /// Move to `status`. Returns the previous status, or `None` when nothing
    /// changed and no event should fire.
    pub fn update_status(&mut self, status: DeviceStatus) -> Option<DeviceStatus> {
        if self.status == status {
            return None;
        }
        tracing::info!(from = %self.status, to = %status, "State transition");
        Some(std::mem::replace(&mut self.status, status))
    }

    /// Our own node number, 0 until `myInfo` arrived.
    pub fn my_node_num(&self) -> u32 {
        self.my_node_info
            .as_ref()
            .map_or(0, |info| info.my_node_num)
    }

    pub fn upsert_node(&mut self, info: NodeInfo) {
        self.nodes.insert(info.num, info);
    }

    pub fn update_user(&mut self, num: u32, user: User) {
        self.node_entry(num).user = Some(user);
    }

    pub fn update_position(&mut self, num: u32, position: Position) {
        self.node_entry(num).position = Some(position);
    }

    fn node_entry(&mut self, num: u32) -> &mut NodeInfo {
        self.nodes.entry(num).or_insert_with(|| NodeInfo {
            num,
            ..Default::default()
        })
    }
}
