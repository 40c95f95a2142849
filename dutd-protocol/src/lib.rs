//! # dutd-protocol
//!
//! Wire protocol for the DUT control link (MTP).
//!
//! This crate provides:
//! - Binary framing with a 2-byte signature and little-endian length prefix
//! - A fixed-capacity reassembly decoder for the chunked TCP byte stream
//! - The closed message-id catalog
//! - Protocol error types and constants

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::{Frame, HEADER_SIZE, RESPONSE_FLAG, SIGNATURE};
pub use message::MsgId;

/// Protocol version written into every frame header. The server carries it
/// but does not validate it.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default port for the dutd server.
pub const DEFAULT_PORT: u16 = 22222;

/// Maximum total frame size (header + payload) in bytes.
pub const MAX_FRAME_SIZE: usize = 1024;

/// Maximum frame payload size in bytes.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - frame::HEADER_SIZE;
