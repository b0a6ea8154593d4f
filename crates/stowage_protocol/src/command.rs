//! Command and response payloads.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, MessageType};
use crate::status::Status;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Minimum encoded command: id, two empty names, empty payload.
const MIN_COMMAND_LEN: usize = 2 + 2 + 2 + 4;

/// Minimum encoded response: code and empty payload.
const MIN_RESPONSE_LEN: usize = 2 + 4;

/// A command addressed to a database and collection.
///
/// ```text
/// u16 id | u16 dbLen | db | u16 collLen | coll | u32 payloadLen | payload
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    /// Command identifier, see [`crate::ids`].
    pub id: u16,
    /// Target database; empty for system commands.
    pub database: String,
    /// Target collection; empty for system and registry commands.
    pub collection: String,
    /// Command-specific payload.
    pub payload: Bytes,
}

impl Command {
    /// Creates a system command with no database or collection.
    pub fn system(id: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Creates a command addressed to a collection.
    pub fn new(
        id: u16,
        database: impl Into<String>,
        collection: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            id,
            database: database.into(),
            collection: collection.into(),
            payload: payload.into(),
        }
    }

    /// Appends the encoded command to `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FieldTooLong`] if a name exceeds `u16::MAX`
    /// bytes or the payload exceeds `u32::MAX` bytes.
    pub fn encode_into(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        let db_len = name_len("database", &self.database)?;
        let coll_len = name_len("collection", &self.collection)?;
        let payload_len = u32::try_from(self.payload.len()).map_err(|_| {
            ProtocolError::FieldTooLong {
                field: "payload",
                len: self.payload.len(),
            }
        })?;

        buf.reserve(MIN_COMMAND_LEN + self.database.len() + self.collection.len() + self.payload.len());
        buf.put_u16(self.id);
        buf.put_u16(db_len);
        buf.put_slice(self.database.as_bytes());
        buf.put_u16(coll_len);
        buf.put_slice(self.collection.as_bytes());
        buf.put_u32(payload_len);
        buf.put_slice(&self.payload);
        Ok(())
    }

    /// Encodes the command into a new buffer.
    ///
    /// # Errors
    ///
    /// See [`Command::encode_into`].
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Wraps the command in a [`MessageType::Command`] message.
    ///
    /// # Errors
    ///
    /// See [`Command::encode_into`].
    pub fn into_message(&self) -> ProtocolResult<Message> {
        Ok(Message::new(MessageType::Command, self.encode()?))
    }

    /// Decodes a command from a message payload.
    ///
    /// The command payload is a zero-copy slice of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooShort`] when any declared length
    /// overflows the input, or [`ProtocolError::InvalidUtf8`] for bad names.
    pub fn decode(data: &Bytes) -> ProtocolResult<Self> {
        if data.len() < MIN_COMMAND_LEN {
            return Err(ProtocolError::PayloadTooShort);
        }

        let mut cursor = &data[..];
        let id = cursor.get_u16();
        let database = take_name(&mut cursor, "database")?;
        if cursor.remaining() < 2 {
            return Err(ProtocolError::PayloadTooShort);
        }
        let collection = take_name(&mut cursor, "collection")?;
        if cursor.remaining() < 4 {
            return Err(ProtocolError::PayloadTooShort);
        }
        let payload_len = cursor.get_u32() as usize;
        if cursor.remaining() < payload_len {
            return Err(ProtocolError::PayloadTooShort);
        }
        let start = data.len() - cursor.remaining();

        Ok(Self {
            id,
            database,
            collection,
            payload: data.slice(start..start + payload_len),
        })
    }
}

/// A response to a command.
///
/// ```text
/// u16 code | u32 payloadLen | payload
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Outcome of the command.
    pub status: Status,
    /// Result data or a short diagnostic text.
    pub payload: Bytes,
}

impl Response {
    /// Creates a response with the given status and payload.
    pub fn new(status: Status, payload: impl Into<Bytes>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }

    /// Creates a response with the given status and an empty payload.
    pub fn status(status: Status) -> Self {
        Self::new(status, Bytes::new())
    }

    /// Creates an OK response carrying `payload`.
    pub fn ok(payload: impl Into<Bytes>) -> Self {
        Self::new(Status::Ok, payload)
    }

    /// Creates an OK response with an empty payload.
    pub fn ok_empty() -> Self {
        Self::status(Status::Ok)
    }

    /// Creates a response carrying a short diagnostic text.
    pub fn text(status: Status, message: &str) -> Self {
        Self::new(status, Bytes::copy_from_slice(message.as_bytes()))
    }

    /// Creates a `BadRequest` response with a diagnostic text.
    pub fn bad_request(message: &str) -> Self {
        Self::text(Status::BadRequest, message)
    }

    /// Appends the encoded response to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(MIN_RESPONSE_LEN + self.payload.len());
        buf.put_u16(self.status.code());
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Encodes the response into a new buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MIN_RESPONSE_LEN + self.payload.len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Wraps the response in a [`MessageType::Response`] message.
    pub fn into_message(&self) -> Message {
        Message::new(MessageType::Response, self.encode())
    }

    /// Decodes a response from a message payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooShort`] for short input and
    /// [`ProtocolError::UnknownStatus`] for unknown codes.
    pub fn decode(data: &Bytes) -> ProtocolResult<Self> {
        if data.len() < MIN_RESPONSE_LEN {
            return Err(ProtocolError::PayloadTooShort);
        }
        let mut cursor = &data[..];
        let code = cursor.get_u16();
        let status = Status::from_code(code).ok_or(ProtocolError::UnknownStatus(code))?;
        let payload_len = cursor.get_u32() as usize;
        if cursor.remaining() < payload_len {
            return Err(ProtocolError::PayloadTooShort);
        }
        Ok(Self {
            status,
            payload: data.slice(MIN_RESPONSE_LEN..MIN_RESPONSE_LEN + payload_len),
        })
    }
}

fn name_len(field: &'static str, name: &str) -> ProtocolResult<u16> {
    u16::try_from(name.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: name.len(),
    })
}

fn take_name(cursor: &mut &[u8], field: &'static str) -> ProtocolResult<String> {
    let len = usize::from(cursor.get_u16());
    if cursor.remaining() < len {
        return Err(ProtocolError::PayloadTooShort);
    }
    let name = std::str::from_utf8(&cursor[..len])
        .map_err(|_| ProtocolError::InvalidUtf8(field))?
        .to_string();
    cursor.advance(len);
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ping_command_layout() {
        let bytes = Command::system(1, Bytes::new()).encode().unwrap();
        assert_eq!(&bytes[..], &[0, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn short_command_rejected() {
        let data = Bytes::from_static(&[0, 1, 0, 0, 0]);
        assert!(matches!(
            Command::decode(&data),
            Err(ProtocolError::PayloadTooShort)
        ));
    }

    #[test]
    fn overflowing_name_length_rejected() {
        // dbLen claims 200 bytes
        let data = Bytes::from_static(&[0, 1, 0, 200, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            Command::decode(&data),
            Err(ProtocolError::PayloadTooShort)
        ));
    }

    #[test]
    fn overflowing_payload_length_rejected() {
        let mut data = BytesMut::new();
        data.put_u16(2031);
        data.put_u16(0);
        data.put_u16(0);
        data.put_u32(99);
        data.put_slice(b"abc");
        assert!(matches!(
            Command::decode(&data.freeze()),
            Err(ProtocolError::PayloadTooShort)
        ));
    }

    #[test]
    fn unknown_status_rejected() {
        let data = Bytes::from_static(&[0, 42, 0, 0, 0, 0]);
        assert!(matches!(
            Response::decode(&data),
            Err(ProtocolError::UnknownStatus(42))
        ));
    }

    #[test]
    fn pong_response_layout() {
        let bytes = Response::text(Status::Ok, "pong").encode();
        assert_eq!(&bytes[..], &[0, 1, 0, 0, 0, 4, b'p', b'o', b'n', b'g']);
    }

    proptest! {
        #[test]
        fn command_decode_inverts_encode(
            id in any::<u16>(),
            db in "[a-z]{0,12}",
            coll in "[a-z_]{0,12}",
            payload in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let cmd = Command::new(id, db, coll, payload);
            let decoded = Command::decode(&cmd.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, cmd);
        }

        #[test]
        fn response_decode_inverts_encode(
            idx in 0..Status::ALL.len(),
            payload in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let resp = Response::new(Status::ALL[idx], payload);
            prop_assert_eq!(Response::decode(&resp.encode()).unwrap(), resp);
        }

        #[test]
        fn message_decode_inverts_encode(payload in prop::collection::vec(any::<u8>(), 1..64)) {
            let msg = Message::new(MessageType::Command, payload);
            prop_assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
        }
    }
}
