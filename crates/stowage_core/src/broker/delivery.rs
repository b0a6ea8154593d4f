//! Per-subscriber batching and hand-off to the connection layer.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Where a subscriber's batches go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    /// Subscribing connection.
    pub subscriber_id: u64,
    /// Broker collection's database.
    pub database: String,
    /// Broker collection name.
    pub collection: String,
    /// Subscription pattern.
    pub subject: String,
}

/// Receives batches from delivery tasks.
///
/// Implemented by the server, which frames each batch as a delivery command
/// on the subscriber's connection. `deliver` runs on the delivery task and
/// must not block.
pub trait DeliverySink: Send + Sync + 'static {
    /// Hands over one batch, in publish order.
    fn deliver(&self, target: &DeliveryTarget, messages: Vec<Bytes>);

    /// Returns false for subscribers whose connection is gone.
    fn is_healthy(&self, _subscriber_id: u64) -> bool {
        true
    }
}

/// Collects delivered batches in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: parking_lot::Mutex<Vec<(DeliveryTarget, Vec<Bytes>)>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Every batch delivered so far.
    pub fn batches(&self) -> Vec<(DeliveryTarget, Vec<Bytes>)> {
        self.batches.lock().clone()
    }

    /// Number of messages delivered to `subscriber_id`.
    pub fn message_count(&self, subscriber_id: u64) -> usize {
        self.batches
            .lock()
            .iter()
            .filter(|(t, _)| t.subscriber_id == subscriber_id)
            .map(|(_, m)| m.len())
            .sum()
    }
}

impl DeliverySink for RecordingSink {
    fn deliver(&self, target: &DeliveryTarget, messages: Vec<Bytes>) {
        self.batches.lock().push((target.clone(), messages));
    }
}

/// Drains a subscriber's channel into batches.
///
/// A batch is flushed when it reaches `batch_size` or when `batch_timeout`
/// passes with messages pending. When the channel closes the pending batch
/// is flushed and the task ends.
pub(crate) async fn run_delivery(
    mut rx: mpsc::Receiver<Bytes>,
    sink: Arc<dyn DeliverySink>,
    target: DeliveryTarget,
    batch_size: usize,
    batch_timeout: Duration,
) {
    let batch_size = batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let mut timer = interval_at(Instant::now() + batch_timeout, batch_timeout);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => {
                    batch.push(msg);
                    if batch.len() >= batch_size {
                        sink.deliver(&target, std::mem::replace(&mut batch, Vec::with_capacity(batch_size)));
                        timer.reset();
                    }
                }
                None => {
                    if !batch.is_empty() {
                        sink.deliver(&target, batch);
                    }
                    break;
                }
            },
            _ = timer.tick() => {
                if !batch.is_empty() {
                    sink.deliver(&target, std::mem::replace(&mut batch, Vec::with_capacity(batch_size)));
                }
            }
        }
    }
    tracing::trace!(subscriber = target.subscriber_id, subject = %target.subject, "delivery task finished");
}
