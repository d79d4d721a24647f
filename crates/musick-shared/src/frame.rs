//! Length-prefixed frame codec.
//!
//! Every frame on the wire is laid out as:
//!
//! ```text
//! | data_len: u32 LE | id: u32 LE | data: [u8; data_len] |
//! ```
//!
//! `id` is the command id (see [`crate::protocol::Command`]) and `data` is a
//! JSON object. Replies reuse the request's id.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::constants::{DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN};
use crate::error::ProtocolError;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub data: Bytes,
}

impl Frame {
    pub fn new(id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    /// Build a frame whose data is the JSON encoding of `value`.
    pub fn json<T: Serialize>(id: u32, value: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(id, serde_json::to_vec(value)?))
    }

    /// Decode the frame data as JSON.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_data_size: usize,
}

impl FrameCodec {
    pub fn new(max_data_size: usize) -> Self {
        Self { max_data_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = &src[..FRAME_HEADER_LEN];
        let data_len = header.get_u32_le() as usize;
        let id = header.get_u32_le();

        if data_len > self.max_data_size {
            return Err(ProtocolError::FrameTooLarge {
                size: data_len,
                max: self.max_data_size,
            });
        }

        let total = FRAME_HEADER_LEN + data_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        let data = src.split_to(data_len).freeze();
        Ok(Some(Frame { id, data }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if frame.data.len() > self.max_data_size {
            return Err(ProtocolError::FrameTooLarge {
                size: frame.data.len(),
                max: self.max_data_size,
            });
        }

        dst.reserve(FRAME_HEADER_LEN + frame.data.len());
        dst.put_u32_le(frame.data.len() as u32);
        dst.put_u32_le(frame.id);
        dst.extend_from_slice(&frame.data);
        Ok(())
    }
}
