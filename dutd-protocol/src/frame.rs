//! Binary frame format for the DUT control link.
//!
//! Frame layout (8 bytes header + payload):
//!
//! ```text
//! +-----------+---------+----------------------+-------------+
//! | signature | version | hw_index:4|msg_id:4  | payload_len |
//! |  2 bytes  | 1 byte  |        1 byte        | 4 bytes LE  |
//! +-----------+---------+----------------------+-------------+
//! | payload                                                  |
//! | payload_len bytes (max 1016)                             |
//! +----------------------------------------------------------+
//! ```
//!
//! Responses reuse the same layout with [`RESPONSE_FLAG`] set on the packed
//! byte. The flag occupies the top bit, so a response frame's hardware-index
//! nibble is not meaningful.

use crate::error::ProtocolError;
use crate::{MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use bytes::{Buf, BufMut, BytesMut};

/// Signature bytes opening every frame: "MT"
pub const SIGNATURE: [u8; 2] = *b"MT";

/// Size of the fixed frame header in bytes (2+1+1+4 = 8).
pub const HEADER_SIZE: usize = 8;

/// Bit set on the packed index/id byte of response frames.
pub const RESPONSE_FLAG: u8 = 0x80;

/// A parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version as carried on the wire (not validated).
    pub version: u8,
    /// Hardware index: which physical radio the request targets.
    pub hw_index: u8,
    /// Message identifier (low 4 bits of the packed byte).
    pub msg_id: u8,
    /// Frame payload.
    pub payload: BytesMut,
}

impl Frame {
    /// Creates a new request frame.
    pub fn new(hw_index: u8, msg_id: u8, payload: BytesMut) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            hw_index,
            msg_id,
            payload,
        }
    }

    /// Returns true iff the buffer holds at least a full header starting
    /// with the frame signature. Used to detect "a new frame begins here"
    /// without parsing the rest.
    pub fn has_valid_header(buf: &[u8]) -> bool {
        buf.len() >= HEADER_SIZE && buf[..2] == SIGNATURE
    }

    /// Returns true if the packed byte carries the response flag.
    pub fn is_response(&self) -> bool {
        self.hw_index & (RESPONSE_FLAG >> 4) != 0
    }

    /// Encodes the frame as a request.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let id_byte = (self.hw_index << 4) | (self.msg_id & 0x0F);
        encode_with_id_byte(self.version, id_byte, &self.payload)
    }

    /// Decodes one frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded (exactly
    /// that frame's bytes are consumed; trailing bytes stay in `buf`),
    /// `Ok(None)` if more data is needed, or `Err` on protocol violations.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let signature = [buf[0], buf[1]];
        if signature != SIGNATURE {
            return Err(ProtocolError::InvalidSignature(signature));
        }

        let version = buf[2];
        let id_byte = buf[3];
        let payload_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if buf.len() < HEADER_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(HEADER_SIZE);
        let payload = buf.split_to(payload_len);

        Ok(Some(Self {
            version,
            hw_index: (id_byte >> 4) & 0x0F,
            msg_id: id_byte & 0x0F,
            payload,
        }))
    }
}

/// Encodes a response frame: same layout as the request with the response
/// flag set and a handler-determined payload (possibly empty).
pub fn encode_response(msg_id: u8, payload: &[u8]) -> Result<BytesMut, ProtocolError> {
    encode_with_id_byte(PROTOCOL_VERSION, (msg_id & 0x0F) | RESPONSE_FLAG, payload)
}

fn encode_with_id_byte(
    version: u8,
    id_byte: u8,
    payload: &[u8],
) -> Result<BytesMut, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&SIGNATURE);
    buf.put_u8(version);
    buf.put_u8(id_byte);
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf)
}
