//! Connection core.
//!
//! Requests are pipelined over one socket. The server answers commands in
//! the order it receives them, so pending requests wait in a FIFO and each
//! incoming response completes the oldest one. Broker deliveries arrive on
//! the same socket as server-initiated commands and are routed to the
//! subscription registered under their `db.coll.subject` key.

use crate::broker::Broker;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::kv::Kv;
use crate::object::Objects;
use crate::registry::Registry;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stowage_codec::{decode_value, Value};
use stowage_protocol::{
    ids, read_frame, BrokerDelivery, Command, Message, MessageType, PayloadReader, PayloadWriter,
    Response, Status, PROTOCOL_VERSION,
};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Login type byte for username and password.
const LOGIN_PASSWORD: u8 = 1;
/// Login type byte for an API key.
const LOGIN_API_KEY: u8 = 2;

/// A connection to a Stowage server.
///
/// Dropping the client stops its background tasks and closes the socket.
pub struct Client {
    inner: Arc<Inner>,
    tasks: Vec<JoinHandle<()>>,
}

pub(crate) struct Inner {
    config: ClientConfig,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Mutex<VecDeque<oneshot::Sender<Response>>>,
    listeners: Mutex<HashMap<String, mpsc::Sender<Bytes>>>,
    closed: AtomicBool,
}

impl Client {
    /// Connects with default settings.
    ///
    /// # Errors
    ///
    /// Fails if the TCP connection cannot be established.
    pub async fn connect_to(addr: SocketAddr) -> ClientResult<Self> {
        Self::connect(ClientConfig::new(addr)).await
    }

    /// Connects and starts the response listener and heartbeat tasks.
    ///
    /// # Errors
    ///
    /// Fails if the TCP connection cannot be established.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let stream = TcpStream::connect(config.addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        tracing::debug!(addr = %config.addr, "connected");

        let heartbeat = config.heartbeat_interval;
        let inner = Arc::new(Inner {
            config,
            writer: tokio::sync::Mutex::new(writer),
            pending: Mutex::new(VecDeque::new()),
            listeners: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let mut tasks = vec![tokio::spawn(listen(Arc::clone(&inner), reader))];
        if let Some(every) = heartbeat {
            tasks.push(tokio::spawn(heartbeat_loop(Arc::clone(&inner), every)));
        }
        Ok(Self { inner, tasks })
    }

    /// Server address.
    pub fn addr(&self) -> SocketAddr {
        self.inner.config.addr
    }

    /// Returns true once the connection is gone.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Sends `cmd` and waits for its response, whatever the status.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, a closed connection or a timeout.
    pub async fn request(&self, cmd: &Command) -> ClientResult<Response> {
        self.inner.request(cmd).await
    }

    /// Sends `cmd` and returns the payload of an OK response.
    ///
    /// # Errors
    ///
    /// Any non-OK status becomes [`ClientError::Status`].
    pub async fn execute(&self, cmd: &Command) -> ClientResult<Bytes> {
        into_payload(self.request(cmd).await?)
    }

    /// Health check. Returns the server's reply text.
    pub async fn ping(&self) -> ClientResult<String> {
        let payload = self.execute(&Command::system(ids::PING, Bytes::new())).await?;
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    /// Protocol versions the server speaks.
    pub async fn supported_versions(&self) -> ClientResult<Vec<u8>> {
        let payload = self
            .execute(&Command::system(ids::SUPPORTED_PROTOCOL_VERSIONS, Bytes::new()))
            .await?;
        let mut reader = PayloadReader::new(&payload);
        let count = usize::from(reader.read_u8()?);
        let versions = reader.read_rest();
        if versions.len() != count {
            return Err(ClientError::unexpected("version list length mismatch"));
        }
        Ok(versions.to_vec())
    }

    /// Fails unless the server speaks this client's protocol version.
    pub async fn check_protocol_version(&self) -> ClientResult<()> {
        let remote = self.supported_versions().await?;
        if remote.contains(&PROTOCOL_VERSION) {
            Ok(())
        } else {
            Err(ClientError::VersionMismatch {
                local: PROTOCOL_VERSION,
                remote,
            })
        }
    }

    /// Logs in with a username and password.
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<()> {
        let payload = PayloadWriter::new()
            .put_u8(LOGIN_PASSWORD)
            .put_str16("username", username)?
            .put_str16("password", password)?
            .finish();
        self.execute(&Command::system(ids::LOGIN, payload)).await?;
        tracing::debug!(username, "logged in");
        Ok(())
    }

    /// Logs in with an API key.
    pub async fn login_api_key(&self, key: &str) -> ClientResult<()> {
        let payload = PayloadWriter::new()
            .put_u8(LOGIN_API_KEY)
            .put_str16("api key", key)?
            .finish();
        self.execute(&Command::system(ids::LOGIN, payload)).await?;
        Ok(())
    }

    /// Returns true if the connection carries an active user.
    pub async fn auth_status(&self) -> ClientResult<bool> {
        let response = self.request(&Command::system(ids::AUTH_STATUS, Bytes::new())).await?;
        match response.status {
            Status::Ok => Ok(true),
            Status::Unauthorized => Ok(false),
            _ => into_payload(response).map(|_| false),
        }
    }

    /// Key-value commands on `database/collection`.
    pub fn kv<'a>(&'a self, database: &'a str, collection: &'a str) -> Kv<'a> {
        Kv::new(self, database, collection)
    }

    /// Object commands on `database/collection`.
    pub fn objects<'a>(&'a self, database: &'a str, collection: &'a str) -> Objects<'a> {
        Objects::new(self, database, collection)
    }

    /// Broker commands on `database/collection`.
    pub fn broker<'a>(&'a self, database: &'a str, collection: &'a str) -> Broker<'a> {
        Broker::new(self, database, collection)
    }

    /// Database and collection management.
    pub fn registry(&self) -> Registry<'_> {
        Registry::new(self)
    }

    /// Shuts the socket down and stops the background tasks.
    pub async fn close(self) {
        self.inner.close();
        if let Err(err) = self.inner.writer.lock().await.shutdown().await {
            tracing::debug!(error = %err, "socket shutdown failed");
        }
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.inner.config.addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the connection closed and fails every waiter.
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pending.lock().clear();
        self.listeners.lock().clear();
    }

    async fn request(&self, cmd: &Command) -> ClientResult<Response> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        let mut frame = BytesMut::new();
        cmd.into_message()?.encode_frame_into(&mut frame)?;

        let rx = {
            let mut writer = self.writer.lock().await;
            let (tx, rx) = oneshot::channel();
            self.pending.lock().push_back(tx);
            if self.is_closed() {
                return Err(ClientError::ConnectionClosed);
            }
            let written = match writer.write_all(&frame).await {
                Ok(()) => writer.flush().await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                self.close();
                return Err(err.into());
            }
            rx
        };

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    fn complete(&self, response: Response) {
        match self.pending.lock().pop_front() {
            // A send error means the caller timed out and went away.
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::warn!(status = %response.status, "response without a pending request"),
        }
    }

    pub(crate) fn add_listener(&self, key: String) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(self.config.subscription_buffer);
        self.listeners.lock().insert(key, tx);
        rx
    }

    pub(crate) fn remove_listener(&self, key: &str) {
        self.listeners.lock().remove(key);
    }

    fn route(&self, payload: &Bytes) {
        let delivery = match Command::decode(payload) {
            Ok(cmd) if cmd.id == ids::broker::CLIENT_MESSAGE => BrokerDelivery::from_command(&cmd),
            Ok(cmd) => {
                tracing::warn!(command_id = cmd.id, "unexpected server command");
                return;
            }
            Err(err) => Err(err),
        };
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                tracing::warn!(error = %err, "malformed delivery");
                return;
            }
        };

        let key = delivery.listener_key();
        let Some(tx) = self.listeners.lock().get(&key).cloned() else {
            tracing::debug!(key = %key, "delivery without listener");
            return;
        };
        for message in delivery.messages {
            match tx.try_send(Bytes::from(message)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(key = %key, "subscription buffer full, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.remove_listener(&key);
                    return;
                }
            }
        }
    }
}

/// Reads frames until the socket closes and demultiplexes them.
async fn listen(inner: Arc<Inner>, reader: OwnedReadHalf) {
    let mut reader = BufReader::new(reader);
    let mut buf = BytesMut::new();
    loop {
        let frame = match read_frame(&mut reader, &mut buf).await {
            Ok(frame) => frame,
            Err(err) if err.is_eof() => break,
            Err(err) => {
                tracing::warn!(error = %err, "read failed");
                break;
            }
        };
        let message = match Message::decode(&frame) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "undecodable message");
                continue;
            }
        };
        match message.message_type {
            MessageType::Response => match Response::decode(&message.payload) {
                Ok(response) => inner.complete(response),
                Err(err) => {
                    tracing::warn!(error = %err, "undecodable response");
                    inner.pending.lock().pop_front();
                }
            },
            MessageType::Command => inner.route(&message.payload),
        }
    }
    tracing::debug!(addr = %inner.config.addr, "connection closed");
    inner.close();
}

async fn heartbeat_loop(inner: Arc<Inner>, every: std::time::Duration) {
    let ping = Command::system(ids::PING, Bytes::new());
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        ticker.tick().await;
        if inner.is_closed() {
            break;
        }
        match inner.request(&ping).await {
            Ok(response) if response.status == Status::Ok => tracing::trace!("heartbeat"),
            Ok(response) => tracing::warn!(status = %response.status, "heartbeat rejected"),
            Err(ClientError::ConnectionClosed) => break,
            Err(err) => tracing::warn!(error = %err, "heartbeat failed"),
        }
    }
}

/// Returns the payload of an OK response or the status as an error.
pub(crate) fn into_payload(response: Response) -> ClientResult<Bytes> {
    if response.status == Status::Ok {
        Ok(response.payload)
    } else {
        Err(ClientError::Status {
            status: response.status,
            message: String::from_utf8_lossy(&response.payload).into_owned(),
        })
    }
}

/// Decodes a payload holding exactly one codex value.
pub(crate) fn value_of(payload: &Bytes) -> ClientResult<Value> {
    Ok(decode_value(payload)?)
}

/// Maps `NotFound` to `None`.
pub(crate) fn optional<T>(result: ClientResult<T>) -> ClientResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

pub(crate) fn read_u32(payload: &Bytes) -> ClientResult<u32> {
    Ok(PayloadReader::new(payload).read_u32()?)
}

pub(crate) fn read_u64(payload: &Bytes) -> ClientResult<u64> {
    Ok(PayloadReader::new(payload).read_u64()?)
}

pub(crate) fn string_list(value: Value) -> ClientResult<Vec<String>> {
    let Value::List(items) = value else {
        return Err(ClientError::unexpected(format!("expected a list, got {}", value.type_name())));
    };
    items
        .into_iter()
        .map(|item| item.into_string().ok_or_else(|| ClientError::unexpected("expected strings")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stowage_protocol::write_frame;
    use tokio::net::TcpListener;

    /// Accepts one connection, answers every command with `pong`, and
    /// pushes one delivery for `sys.events.a.*` before the first answer.
    async fn fake_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            let mut buf = BytesMut::new();
            let mut first = true;
            while let Ok(frame) = read_frame(&mut reader, &mut buf).await {
                let message = Message::decode(&frame).unwrap();
                Command::decode(&message.payload).unwrap();
                if first {
                    let delivery = BrokerDelivery {
                        database: "sys".into(),
                        collection: "events".into(),
                        subject: "a.*".into(),
                        messages: vec![b"m1".to_vec(), b"m2".to_vec()],
                    };
                    let msg = delivery.to_command().unwrap().into_message().unwrap();
                    write_frame(&mut writer, &msg.encode()).await.unwrap();
                    first = false;
                }
                let pong = Response::text(Status::Ok, "pong").into_message();
                write_frame(&mut writer, &pong.encode()).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn responses_and_deliveries_are_demultiplexed() {
        let addr = fake_server().await;
        let client = Client::connect(ClientConfig::new(addr).without_heartbeat())
            .await
            .unwrap();
        let mut rx = client.inner().add_listener("sys.events.a.*".into());

        assert_eq!(client.ping().await.unwrap(), "pong");
        assert_eq!(client.ping().await.unwrap(), "pong");
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"m1");
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"m2");
    }

    #[tokio::test]
    async fn requests_fail_after_server_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let client = Client::connect(ClientConfig::new(addr).without_heartbeat())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.is_closed());
        assert!(matches!(client.ping().await, Err(ClientError::ConnectionClosed)));
    }

    #[test]
    fn non_ok_status_becomes_error() {
        let err = into_payload(Response::text(Status::BadRequest, "invalid TTL")).unwrap_err();
        assert_eq!(err.status(), Some(Status::BadRequest));
        assert!(matches!(optional::<()>(Err(err)), Err(ClientError::Status { .. })));

        let missing = into_payload(Response::status(Status::NotFound));
        assert_eq!(optional(missing).unwrap(), None);
    }
}
