//! Message envelope.
//!
//! ```text
//! u8 magic (0x7E) | u8 version | u8 flags | u8 type | u32 payloadLen | payload
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::checked_len;
use bytes::{BufMut, Bytes, BytesMut};

/// First byte of every message.
pub const MAGIC: u8 = 0x7E;

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Protocol versions advertised by `SupportedProtocolVersions`.
pub const SUPPORTED_VERSIONS: &[u8] = &[PROTOCOL_VERSION];

/// Size of the fixed message header.
pub const HEADER_LEN: usize = 8;

/// Kind of payload a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// A [`crate::Command`]; sent by clients, and by the server for broker
    /// deliveries.
    Command = 1,
    /// A [`crate::Response`] to a command.
    Response = 2,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> ProtocolResult<Self> {
        match value {
            1 => Ok(MessageType::Command),
            2 => Ok(MessageType::Response),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Protocol version.
    pub version: u8,
    /// Reserved flag bits.
    pub flags: u8,
    /// Payload kind.
    pub message_type: MessageType,
    /// Encoded command or response.
    pub payload: Bytes,
}

impl Message {
    /// Creates a version-1 message with no flags.
    pub fn new(message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            flags: 0,
            message_type,
            payload: payload.into(),
        }
    }

    /// Appends the encoded message to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN + self.payload.len());
        buf.put_u8(MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(self.flags);
        buf.put_u8(self.message_type as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Encodes the message into a new buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Appends `u32 length | message` to `buf`, ready for a single write.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameLengthInvalid`] if the message exceeds
    /// the frame cap; `buf` is left untouched in that case.
    pub fn encode_frame_into(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        let len = checked_len(HEADER_LEN + self.payload.len())?;
        buf.reserve(4 + len as usize);
        buf.put_u32(len);
        self.encode_into(buf);
        Ok(())
    }

    /// Decodes a message from a frame payload.
    ///
    /// The returned payload is a zero-copy slice of `frame`. Bytes beyond
    /// the declared payload length are ignored.
    ///
    /// # Errors
    ///
    /// Fails on a missing or wrong magic byte, a short header, an unknown
    /// version or type, an empty payload, or a truncated payload.
    pub fn decode(frame: &Bytes) -> ProtocolResult<Self> {
        let Some(&magic) = frame.first() else {
            return Err(ProtocolError::PayloadTooShort);
        };
        if magic != MAGIC {
            return Err(ProtocolError::MagicNumberInvalid(magic));
        }
        if frame.len() < HEADER_LEN {
            return Err(ProtocolError::PayloadTooShort);
        }

        let version = frame[1];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::InvalidProtocolVersion(version));
        }
        let flags = frame[2];
        let message_type = MessageType::try_from(frame[3])?;

        let payload_len = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
        if payload_len == 0 {
            return Err(ProtocolError::EmptyPayload);
        }
        if frame.len() - HEADER_LEN < payload_len {
            return Err(ProtocolError::PayloadTooShort);
        }

        Ok(Self {
            version,
            flags,
            message_type,
            payload: frame.slice(HEADER_LEN..HEADER_LEN + payload_len),
        })
    }
}
