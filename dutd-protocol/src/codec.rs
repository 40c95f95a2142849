//! Encoder and reassembly decoder for the DUT control link.
//!
//! A stream socket does not preserve message boundaries: one `read` can
//! return a fraction of a frame or several frames glued together. The
//! [`Decoder`] accumulates raw reads in a fixed-capacity window and hands
//! out complete frames one at a time.

use crate::error::ProtocolError;
use crate::frame::{self, Frame};
use crate::message::MsgId;
use crate::MAX_FRAME_SIZE;
use bytes::BytesMut;

/// Encodes requests and responses into framed bytes.
pub struct Encoder;

impl Encoder {
    /// Encodes a request frame. Used by controller-side code and tests.
    pub fn encode_request(
        hw_index: u8,
        msg_id: MsgId,
        payload: &[u8],
    ) -> Result<BytesMut, ProtocolError> {
        Frame::new(hw_index, msg_id.id(), BytesMut::from(payload)).encode()
    }

    /// Encodes a response frame with the response flag set.
    pub fn encode_response(msg_id: u8, payload: &[u8]) -> Result<BytesMut, ProtocolError> {
        frame::encode_response(msg_id, payload)
    }
}

/// Reassembles frames from arbitrarily-chunked reads.
///
/// The window is capped at [`MAX_FRAME_SIZE`] logical bytes and never grows
/// past it: a peer that streams more than one frame's worth of bytes without
/// ever completing a frame is violating the protocol.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Appends freshly-read bytes to the window.
    ///
    /// If a previous frame is still incomplete and the new bytes alone begin
    /// with a valid header, the peer has abandoned the in-flight message and
    /// started a new one: the stale bytes are discarded first. Returns the
    /// number of stale bytes dropped (0 in the common case).
    ///
    /// Fails with [`ProtocolError::BufferOverflow`] when the window would
    /// exceed its capacity; the window (old and new bytes alike) is emptied.
    pub fn extend(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        let mut discarded = 0;
        if !self.buffer.is_empty() && Frame::has_valid_header(data) {
            discarded = self.buffer.len();
            self.buffer.clear();
        }

        let size = self.buffer.len() + data.len();
        if size > MAX_FRAME_SIZE {
            self.buffer.clear();
            return Err(ProtocolError::BufferOverflow {
                size,
                capacity: MAX_FRAME_SIZE,
            });
        }

        self.buffer.extend_from_slice(data);
        Ok(discarded)
    }

    /// Attempts to decode the next frame from the window.
    ///
    /// A complete frame is consumed from the front; bytes following it are
    /// retained as the start of the next frame. On a protocol violation the
    /// whole window is dropped before the error is returned.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        match Frame::decode(&mut self.buffer) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
