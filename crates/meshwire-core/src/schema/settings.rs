//! Device configuration sections and channel definitions.
//!
//! Only the fields this client reads or writes are modelled; everything else
//! in a section is skipped on decode.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Config {
    #[prost(oneof = "config::PayloadVariant", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub payload_variant: ::core::option::Option<config::PayloadVariant>,
}

pub mod config {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        #[prost(message, tag = "1")]
        Device(DeviceConfig),
        #[prost(message, tag = "2")]
        Position(PositionConfig),
        #[prost(message, tag = "3")]
        Power(PowerConfig),
        #[prost(message, tag = "4")]
        Network(NetworkConfig),
        #[prost(message, tag = "5")]
        Display(DisplayConfig),
        #[prost(message, tag = "6")]
        Lora(LoRaConfig),
        #[prost(message, tag = "7")]
        Bluetooth(BluetoothConfig),
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeviceConfig {
        #[prost(int32, tag = "1")]
        pub role: i32,
        #[prost(bool, tag = "2")]
        pub serial_enabled: bool,
        #[prost(uint32, tag = "4")]
        pub button_gpio: u32,
        #[prost(uint32, tag = "5")]
        pub buzzer_gpio: u32,
        #[prost(int32, tag = "6")]
        pub rebroadcast_mode: i32,
        #[prost(uint32, tag = "7")]
        pub node_info_broadcast_secs: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PositionConfig {
        #[prost(uint32, tag = "1")]
        pub position_broadcast_secs: u32,
        #[prost(bool, tag = "2")]
        pub position_broadcast_smart_enabled: bool,
        #[prost(bool, tag = "3")]
        pub fixed_position: bool,
        #[prost(uint32, tag = "5")]
        pub gps_update_interval: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PowerConfig {
        #[prost(bool, tag = "1")]
        pub is_power_saving: bool,
        #[prost(uint32, tag = "2")]
        pub on_battery_shutdown_after_secs: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NetworkConfig {
        #[prost(bool, tag = "1")]
        pub wifi_enabled: bool,
        #[prost(string, tag = "3")]
        pub wifi_ssid: String,
        #[prost(string, tag = "4")]
        pub wifi_psk: String,
        #[prost(string, tag = "5")]
        pub ntp_server: String,
        #[prost(bool, tag = "6")]
        pub eth_enabled: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DisplayConfig {
        #[prost(uint32, tag = "1")]
        pub screen_on_secs: u32,
        #[prost(uint32, tag = "3")]
        pub auto_screen_carousel_secs: u32,
        #[prost(bool, tag = "5")]
        pub flip_screen: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LoRaConfig {
        #[prost(bool, tag = "1")]
        pub use_preset: bool,
        #[prost(int32, tag = "2")]
        pub modem_preset: i32,
        #[prost(uint32, tag = "3")]
        pub bandwidth: u32,
        #[prost(uint32, tag = "4")]
        pub spread_factor: u32,
        #[prost(uint32, tag = "5")]
        pub coding_rate: u32,
        #[prost(float, tag = "6")]
        pub frequency_offset: f32,
        #[prost(int32, tag = "7")]
        pub region: i32,
        #[prost(uint32, tag = "8")]
        pub hop_limit: u32,
        #[prost(bool, tag = "9")]
        pub tx_enabled: bool,
        #[prost(int32, tag = "10")]
        pub tx_power: i32,
        #[prost(uint32, tag = "11")]
        pub channel_num: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BluetoothConfig {
        #[prost(bool, tag = "1")]
        pub enabled: bool,
        #[prost(int32, tag = "2")]
        pub mode: i32,
        #[prost(uint32, tag = "3")]
        pub fixed_pin: u32,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleConfig {
    #[prost(oneof = "module_config::PayloadVariant", tags = "1, 2, 4, 5, 6, 10")]
    pub payload_variant: ::core::option::Option<module_config::PayloadVariant>,
}

pub mod module_config {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        #[prost(message, tag = "1")]
        Mqtt(MqttConfig),
        #[prost(message, tag = "2")]
        Serial(SerialConfig),
        #[prost(message, tag = "4")]
        StoreForward(StoreForwardConfig),
        #[prost(message, tag = "5")]
        RangeTest(RangeTestConfig),
        #[prost(message, tag = "6")]
        Telemetry(TelemetryConfig),
        #[prost(message, tag = "10")]
        NeighborInfo(NeighborInfoConfig),
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MqttConfig {
        #[prost(bool, tag = "1")]
        pub enabled: bool,
        #[prost(string, tag = "2")]
        pub address: String,
        #[prost(string, tag = "3")]
        pub username: String,
        #[prost(string, tag = "4")]
        pub password: String,
        #[prost(bool, tag = "5")]
        pub encryption_enabled: bool,
        #[prost(bool, tag = "6")]
        pub json_enabled: bool,
        #[prost(string, tag = "8")]
        pub root: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SerialConfig {
        #[prost(bool, tag = "1")]
        pub enabled: bool,
        #[prost(bool, tag = "2")]
        pub echo: bool,
        #[prost(uint32, tag = "3")]
        pub rxd: u32,
        #[prost(uint32, tag = "4")]
        pub txd: u32,
        #[prost(int32, tag = "5")]
        pub baud: i32,
        #[prost(uint32, tag = "6")]
        pub timeout: u32,
        #[prost(int32, tag = "7")]
        pub mode: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StoreForwardConfig {
        #[prost(bool, tag = "1")]
        pub enabled: bool,
        #[prost(bool, tag = "2")]
        pub heartbeat: bool,
        #[prost(uint32, tag = "3")]
        pub records: u32,
        #[prost(uint32, tag = "4")]
        pub history_return_max: u32,
        #[prost(uint32, tag = "5")]
        pub history_return_window: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RangeTestConfig {
        #[prost(bool, tag = "1")]
        pub enabled: bool,
        #[prost(uint32, tag = "2")]
        pub sender: u32,
        #[prost(bool, tag = "3")]
        pub save: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TelemetryConfig {
        #[prost(uint32, tag = "1")]
        pub device_update_interval: u32,
        #[prost(uint32, tag = "2")]
        pub environment_update_interval: u32,
        #[prost(bool, tag = "3")]
        pub environment_measurement_enabled: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NeighborInfoConfig {
        #[prost(bool, tag = "1")]
        pub enabled: bool,
        #[prost(uint32, tag = "2")]
        pub update_interval: u32,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelSettings {
    #[prost(bytes = "vec", tag = "2")]
    pub psk: Vec<u8>,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(fixed32, tag = "4")]
    pub id: u32,
    #[prost(bool, tag = "5")]
    pub uplink_enabled: bool,
    #[prost(bool, tag = "6")]
    pub downlink_enabled: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Channel {
    #[prost(int32, tag = "1")]
    pub index: i32,
    #[prost(message, optional, tag = "2")]
    pub settings: Option<ChannelSettings>,
    #[prost(enumeration = "channel::Role", tag = "3")]
    pub role: i32,
}

pub mod channel {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Role {
        Disabled = 0,
        Primary = 1,
        Secondary = 2,
    }
}

impl Channel {
    /// A disabled slot at `index`, used to clear a channel.
    pub fn disabled(index: i32) -> Self {
        Self {
            index,
            settings: None,
            role: channel::Role::Disabled as i32,
        }
    }
}
