//! HTTP/2 framing

pub mod frame;

pub use frame::{FrameHeader, FRAME_HEADER_LEN};
