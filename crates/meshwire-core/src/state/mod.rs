//! Session state and inbound dispatch.

pub mod handlers;
pub mod machine;

pub use handlers::{HandleResult, HandlerContext, handle_from_radio, handle_mesh_packet};
pub use machine::{DeviceStatus, SessionState};
