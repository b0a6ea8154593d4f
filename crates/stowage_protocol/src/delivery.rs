//! Server-initiated broker deliveries.

use crate::command::Command;
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids;
use crate::payload::{PayloadReader, PayloadWriter};
use stowage_codec::Value;

/// A batch of published messages pushed to a subscriber.
///
/// Travels as a [`Command`] with id [`ids::broker::CLIENT_MESSAGE`]
/// addressed to the broker collection. Payload:
///
/// ```text
/// u16 subjectLen | subject | codex List of Binary
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerDelivery {
    /// Database of the broker collection.
    pub database: String,
    /// Broker collection name.
    pub collection: String,
    /// Subject or pattern the subscription was registered under.
    pub subject: String,
    /// Message bodies in publish order.
    pub messages: Vec<Vec<u8>>,
}

impl BrokerDelivery {
    /// Builds the delivery command.
    ///
    /// # Errors
    ///
    /// Fails if the subject is longer than `u16::MAX` bytes.
    pub fn to_command(&self) -> ProtocolResult<Command> {
        let list = Value::List(self.messages.iter().cloned().map(Value::Binary).collect());
        let payload = PayloadWriter::new()
            .put_str16("subject", &self.subject)?
            .put_value(&list)?
            .finish();
        Ok(Command::new(
            ids::broker::CLIENT_MESSAGE,
            self.database.clone(),
            self.collection.clone(),
            payload,
        ))
    }

    /// Parses a delivery command.
    ///
    /// # Errors
    ///
    /// Fails on a truncated payload or when the list holds non-binary items.
    pub fn from_command(cmd: &Command) -> ProtocolResult<Self> {
        let mut reader = PayloadReader::new(&cmd.payload);
        let subject = reader.read_str16("subject")?;
        let messages = match reader.read_value()? {
            Value::List(items) => items
                .into_iter()
                .map(|item| item.into_binary().ok_or(ProtocolError::PayloadTooShort))
                .collect::<ProtocolResult<Vec<_>>>()?,
            _ => return Err(ProtocolError::PayloadTooShort),
        };
        Ok(Self {
            database: cmd.database.clone(),
            collection: cmd.collection.clone(),
            subject,
            messages,
        })
    }

    /// Listener key used by clients to route deliveries: `db.coll.subject`.
    pub fn listener_key(&self) -> String {
        listener_key(&self.database, &self.collection, &self.subject)
    }
}

/// Builds the `db.coll.subject` key that client listeners are registered under.
pub fn listener_key(database: &str, collection: &str, subject: &str) -> String {
    format!("{database}.{collection}.{subject}")
}
