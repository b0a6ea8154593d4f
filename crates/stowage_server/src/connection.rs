//! Per-connection state and the connection map.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stowage_core::broker::{DeliverySink, DeliveryTarget};
use stowage_core::now_millis;
use stowage_core::users::User;
use stowage_protocol::{BrokerDelivery, Message};
use tokio::sync::{mpsc, watch};

/// Outbound queue depth per connection.
pub const OUTBOUND_CAPACITY: usize = 1024;

/// State attached to one client connection.
///
/// Outbound frames (responses and broker deliveries) go through a bounded
/// queue drained by the connection's writer task, so senders never touch
/// the socket.
#[derive(Debug)]
pub struct ConnectionContext {
    id: u64,
    peer: SocketAddr,
    user: RwLock<Option<User>>,
    last_activity: AtomicI64,
    outbound: mpsc::Sender<Bytes>,
    closed: watch::Sender<bool>,
}

impl ConnectionContext {
    /// Creates a context and the receiving end of its outbound queue.
    pub fn new(id: u64, peer: SocketAddr) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (closed, _) = watch::channel(false);
        let ctx = Arc::new(Self {
            id,
            peer,
            user: RwLock::new(None),
            last_activity: AtomicI64::new(now_millis()),
            outbound,
            closed,
        });
        (ctx, rx)
    }

    /// Connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<User> {
        self.user.read().clone()
    }

    /// Attaches `user` to the connection.
    pub fn set_user(&self, user: User) {
        *self.user.write() = Some(user);
    }

    /// Records activity now.
    pub fn touch(&self) {
        self.last_activity.store(now_millis(), Ordering::Relaxed);
    }

    /// Unix milliseconds of the last successful frame read.
    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Returns true if the connection has been silent longer than `timeout`.
    pub fn is_idle(&self, now_ms: i64, timeout: Duration) -> bool {
        now_ms - self.last_activity() > timeout.as_millis() as i64
    }

    /// Queues an encoded message, waiting for room.
    ///
    /// Returns false once the writer is gone.
    pub async fn send(&self, message: Bytes) -> bool {
        self.outbound.send(message).await.is_ok()
    }

    /// Queues an encoded message without waiting.
    ///
    /// Returns false if the queue is full or the writer is gone.
    pub fn try_send(&self, message: Bytes) -> bool {
        self.outbound.try_send(message).is_ok()
    }

    /// Asks the connection's tasks to stop.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Returns true after [`ConnectionContext::close`].
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.outbound.is_closed()
    }

    /// Receiver that changes to `true` when the connection is closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

/// Live connections by id.
#[derive(Debug, Default)]
pub struct ConnectionMap {
    next_id: AtomicU64,
    connections: Mutex<HashMap<u64, Arc<ConnectionContext>>>,
}

impl ConnectionMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a connection id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Adds a connection.
    pub fn register(&self, ctx: Arc<ConnectionContext>) {
        self.connections.lock().insert(ctx.id(), ctx);
    }

    /// Removes a connection.
    pub fn deregister(&self, id: u64) -> Option<Arc<ConnectionContext>> {
        self.connections.lock().remove(&id)
    }

    /// Looks a connection up.
    pub fn get(&self, id: u64) -> Option<Arc<ConnectionContext>> {
        self.connections.lock().get(&id).cloned()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns true if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Closes connections idle for longer than `timeout`; returns their ids.
    pub fn reap_idle(&self, now_ms: i64, timeout: Duration) -> Vec<u64> {
        let idle: Vec<Arc<ConnectionContext>> = self
            .connections
            .lock()
            .values()
            .filter(|c| c.is_idle(now_ms, timeout))
            .cloned()
            .collect();
        for ctx in &idle {
            ctx.close();
        }
        idle.iter().map(|c| c.id()).collect()
    }

    /// Closes every connection.
    pub fn close_all(&self) {
        let all: Vec<Arc<ConnectionContext>> = self.connections.lock().values().cloned().collect();
        for ctx in all {
            ctx.close();
        }
    }
}

/// Routes broker batches onto subscriber connections.
#[derive(Debug)]
pub struct ConnectionSink {
    connections: Arc<ConnectionMap>,
}

impl ConnectionSink {
    /// Creates a sink over `connections`.
    pub fn new(connections: Arc<ConnectionMap>) -> Self {
        Self { connections }
    }
}

impl DeliverySink for ConnectionSink {
    fn deliver(&self, target: &DeliveryTarget, messages: Vec<Bytes>) {
        let Some(conn) = self.connections.get(target.subscriber_id) else {
            return;
        };
        let delivery = BrokerDelivery {
            database: target.database.clone(),
            collection: target.collection.clone(),
            subject: target.subject.clone(),
            messages: messages.into_iter().map(|m| m.to_vec()).collect(),
        };
        let encoded = delivery
            .to_command()
            .and_then(|cmd| cmd.into_message())
            .map(|msg: Message| msg.encode());
        match encoded {
            Ok(frame) => {
                if !conn.try_send(frame) {
                    tracing::debug!(
                        conn_id = conn.id(),
                        subject = %target.subject,
                        "outbound queue full, delivery dropped"
                    );
                }
            }
            Err(err) => tracing::warn!(conn_id = conn.id(), error = %err, "cannot encode delivery"),
        }
    }

    fn is_healthy(&self, subscriber_id: u64) -> bool {
        self.connections
            .get(subscriber_id)
            .is_some_and(|c| !c.is_closed())
    }
}
