//! Protocol module - framing and wire constants.

pub mod constants;
pub mod frame;

pub use constants::*;
pub use frame::{FrameDecoder, FrameError, encode_frame};
