//! Broker commands and subscriptions.

use crate::client::{Client, Inner};
use crate::error::ClientResult;
use bytes::Bytes;
use stowage_codec::Value;
use stowage_protocol::ids::broker as id;
use stowage_protocol::{listener_key, Command, PayloadWriter};
use tokio::sync::mpsc;

/// Messages delivered for one subscription, in publish order.
///
/// Dropping the subscription stops local routing but does not unsubscribe
/// on the server; use [`Broker::unsubscribe`] for that.
#[derive(Debug)]
pub struct Subscription {
    key: String,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    /// Listener key, `db.coll.subject`.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the next message. `None` once the connection is gone.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Returns a message if one is already buffered.
    pub fn try_next(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

/// Broker commands bound to one collection.
#[derive(Debug, Clone, Copy)]
pub struct Broker<'a> {
    client: &'a Client,
    database: &'a str,
    collection: &'a str,
}

impl<'a> Broker<'a> {
    pub(crate) fn new(client: &'a Client, database: &'a str, collection: &'a str) -> Self {
        Self {
            client,
            database,
            collection,
        }
    }

    fn inner(&self) -> &Inner {
        self.client.inner()
    }

    async fn call(&self, command: u16, payload: PayloadWriter) -> ClientResult<Bytes> {
        let cmd = Command::new(command, self.database, self.collection, payload.finish());
        self.client.execute(&cmd).await
    }

    async fn listen(&self, subject: &str, payload: PayloadWriter, command: u16) -> ClientResult<Subscription> {
        // Registered first so deliveries racing the response are kept.
        let key = listener_key(self.database, self.collection, subject);
        let rx = self.inner().add_listener(key.clone());
        if let Err(err) = self.call(command, payload).await {
            self.inner().remove_listener(&key);
            return Err(err);
        }
        tracing::debug!(key = %key, "subscribed");
        Ok(Subscription { key, rx })
    }

    /// Subscribes to `subject`; `*` matches one token, a trailing `>` the rest.
    pub async fn subscribe(&self, subject: &str) -> ClientResult<Subscription> {
        let payload = PayloadWriter::new().put_str16("subject", subject)?;
        self.listen(subject, payload, id::SUBSCRIBE).await
    }

    /// Joins queue group `queue` on `subject`; each publish reaches one member.
    pub async fn subscribe_queue(&self, subject: &str, queue: &str) -> ClientResult<Subscription> {
        let payload = PayloadWriter::new()
            .put_str16("subject", subject)?
            .put_str16("queue", queue)?;
        self.listen(subject, payload, id::SUBSCRIBE_QUEUE).await
    }

    /// Drops this connection's subscriptions on `subject`.
    pub async fn unsubscribe(&self, subject: &str) -> ClientResult<()> {
        self.call(id::UNSUBSCRIBE, PayloadWriter::new().put_str16("subject", subject)?)
            .await?;
        self.inner()
            .remove_listener(&listener_key(self.database, self.collection, subject));
        Ok(())
    }

    /// Publishes `message` to `subject`.
    pub async fn publish(&self, subject: &str, message: &[u8]) -> ClientResult<()> {
        let payload = PayloadWriter::new()
            .put_str16("subject", subject)?
            .put_value(&Value::Binary(message.to_vec()))?;
        self.call(id::PUBLISH, payload).await?;
        Ok(())
    }
}
