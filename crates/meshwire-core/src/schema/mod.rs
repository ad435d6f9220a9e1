//! Wire schema for the device link.
//!
//! A wire-compatible subset of the device's protobuf messages, declared with
//! `prost` derives. Fields the client never touches are left out and skipped
//! on decode.

pub mod admin;
pub mod mesh;
pub mod settings;

pub use admin::{AdminMessage, AdminPayload, ConfigType, ModuleConfigType, admin_message};
pub use mesh::*;
pub use settings::{Channel, ChannelSettings, Config, ModuleConfig, channel, config, module_config};
