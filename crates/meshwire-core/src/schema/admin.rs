//! Control-plane messages carried on the admin port.

use prost::Message;

use super::settings::{Channel, Config, ModuleConfig};
use super::mesh::{Data, DeviceMetadata, PortNum, Position, User};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AdminMessage {
    #[prost(
        oneof = "admin_message::PayloadVariant",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 21, 32, 33, 34, 35, 36, 38, 41, 42, 64, 65, 94, 95, 97, 98, 99, 100"
    )]
    pub payload_variant: ::core::option::Option<admin_message::PayloadVariant>,
}

pub mod admin_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        #[prost(uint32, tag = "1")]
        GetChannelRequest(u32),
        #[prost(message, tag = "2")]
        GetChannelResponse(super::Channel),
        #[prost(bool, tag = "3")]
        GetOwnerRequest(bool),
        #[prost(message, tag = "4")]
        GetOwnerResponse(super::User),
        #[prost(enumeration = "ConfigType", tag = "5")]
        GetConfigRequest(i32),
        #[prost(message, tag = "6")]
        GetConfigResponse(super::Config),
        #[prost(enumeration = "ModuleConfigType", tag = "7")]
        GetModuleConfigRequest(i32),
        #[prost(message, tag = "8")]
        GetModuleConfigResponse(super::ModuleConfig),
        #[prost(bool, tag = "10")]
        GetCannedMessageModuleMessagesRequest(bool),
        #[prost(string, tag = "11")]
        GetCannedMessageModuleMessagesResponse(String),
        #[prost(bool, tag = "12")]
        GetDeviceMetadataRequest(bool),
        #[prost(message, tag = "13")]
        GetDeviceMetadataResponse(super::DeviceMetadata),
        #[prost(bool, tag = "21")]
        EnterDfuModeRequest(bool),
        #[prost(message, tag = "32")]
        SetOwner(super::User),
        #[prost(message, tag = "33")]
        SetChannel(super::Channel),
        #[prost(message, tag = "34")]
        SetConfig(super::Config),
        #[prost(message, tag = "35")]
        SetModuleConfig(super::ModuleConfig),
        #[prost(string, tag = "36")]
        SetCannedMessageModuleMessages(String),
        #[prost(uint32, tag = "38")]
        RemoveByNodenum(u32),
        #[prost(message, tag = "41")]
        SetFixedPosition(super::Position),
        #[prost(bool, tag = "42")]
        RemoveFixedPosition(bool),
        #[prost(bool, tag = "64")]
        BeginEditSettings(bool),
        #[prost(bool, tag = "65")]
        CommitEditSettings(bool),
        #[prost(int32, tag = "94")]
        FactoryResetDevice(i32),
        #[prost(int32, tag = "95")]
        RebootOtaSeconds(i32),
        #[prost(int32, tag = "97")]
        RebootSeconds(i32),
        #[prost(int32, tag = "98")]
        ShutdownSeconds(i32),
        #[prost(int32, tag = "99")]
        FactoryResetConfig(i32),
        #[prost(int32, tag = "100")]
        NodedbReset(i32),
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ConfigType {
        DeviceConfig = 0,
        PositionConfig = 1,
        PowerConfig = 2,
        NetworkConfig = 3,
        DisplayConfig = 4,
        LoraConfig = 5,
        BluetoothConfig = 6,
        SecurityConfig = 7,
        SessionkeyConfig = 8,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ModuleConfigType {
        MqttConfig = 0,
        SerialConfig = 1,
        ExtnotifConfig = 2,
        StoreforwardConfig = 3,
        RangetestConfig = 4,
        TelemetryConfig = 5,
        CannedmsgConfig = 6,
        AudioConfig = 7,
        RemotehardwareConfig = 8,
        NeighborinfoConfig = 9,
        AmbientlightingConfig = 10,
        DetectionsensorConfig = 11,
        PaxcounterConfig = 12,
    }
}

pub use admin_message::{ConfigType, ModuleConfigType, PayloadVariant as AdminPayload};

impl AdminMessage {
    pub fn new(payload: AdminPayload) -> Self {
        Self {
            payload_variant: Some(payload),
        }
    }

    /// Wrap into the [`Data`] payload sent on the admin port.
    pub fn into_data(self) -> Data {
        Data {
            portnum: PortNum::AdminApp as i32,
            payload: self.encode_to_vec(),
            ..Default::default()
        }
    }
}
