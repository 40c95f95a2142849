//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur during framing or reassembly.
///
/// Every variant is terminal for the bytes currently buffered on the
/// connection: the caller drops the reassembly window and waits for the
/// peer's next frame attempt. None of them tear the connection down.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid signature bytes: expected 'MT', got {0:?}")]
    InvalidSignature([u8; 2]),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("reassembly window overflow: {size} bytes (capacity {capacity})")]
    BufferOverflow { size: usize, capacity: usize },

    #[error("unknown message id {0:#04x}")]
    UnknownMessageId(u8),
}
