//! Broker engine for one collection.

use crate::broker::delivery::{run_delivery, DeliverySink, DeliveryTarget};
use crate::broker::subject::{pattern_tokens, subject_tokens};
use crate::broker::trie::{Subscriber, Trie};
use crate::config::{BrokerConfig, QueueBalancing};
use crate::error::{CoreError, CoreResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the message was queued for.
    pub enqueued: usize,
    /// Subscribers whose channel was full.
    pub dropped: usize,
}

/// Subject-routed pub/sub with queue groups.
///
/// Each subscription owns a bounded channel and a delivery task that
/// batches messages for the [`DeliverySink`]. Publishing never blocks: a
/// full channel drops the message and bumps [`BrokerEngine::dropped_messages`].
pub struct BrokerEngine {
    database: String,
    collection: String,
    config: BrokerConfig,
    sink: Arc<dyn DeliverySink>,
    trie: Trie,
    global_counter: AtomicU64,
    group_counters: Mutex<HashMap<String, u64>>,
    next_seq: AtomicU64,
    dropped: AtomicU64,
    stop: watch::Sender<bool>,
}

impl BrokerEngine {
    /// Creates an engine and starts its subscriber sweep on the current
    /// tokio runtime, if there is one.
    pub fn new(
        database: &str,
        collection: &str,
        config: BrokerConfig,
        sink: Arc<dyn DeliverySink>,
    ) -> Arc<Self> {
        let (stop, _) = watch::channel(false);
        let engine = Arc::new(Self {
            database: database.to_string(),
            collection: collection.to_string(),
            config,
            sink,
            trie: Trie::default(),
            global_counter: AtomicU64::new(0),
            group_counters: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            stop,
        });

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(run_sweeper(
                Arc::downgrade(&engine),
                engine.stop.subscribe(),
                engine.config.cleanup_interval,
            ));
        }
        engine
    }

    /// Subscribes connection `id` to `pattern`, optionally in a queue group.
    ///
    /// Subscribing again to the same pattern replaces the earlier
    /// subscription.
    ///
    /// # Errors
    ///
    /// Fails on a malformed pattern or outside a tokio runtime.
    pub fn subscribe(&self, pattern: &str, id: u64, queue: Option<String>) -> CoreResult<()> {
        let tokens = pattern_tokens(pattern)?;
        let handle = tokio::runtime::Handle::try_current().map_err(|_| CoreError::NoRuntime)?;
        let queue = queue.filter(|q| !q.is_empty());

        let (sender, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let target = DeliveryTarget {
            subscriber_id: id,
            database: self.database.clone(),
            collection: self.collection.clone(),
            subject: pattern.to_string(),
        };
        handle.spawn(run_delivery(
            rx,
            Arc::clone(&self.sink),
            target,
            self.config.batch_size,
            self.config.batch_timeout,
        ));

        let sub = Subscriber {
            id,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            queue,
            sender,
        };
        if self.trie.insert(&tokens, sub).is_some() {
            tracing::debug!(subscriber = id, pattern, "replaced subscription");
        }
        Ok(())
    }

    /// Removes connection `id`'s subscription to `pattern`.
    ///
    /// Returns false if there was none. The delivery task flushes what it
    /// holds and exits.
    pub fn unsubscribe(&self, pattern: &str, id: u64) -> bool {
        match pattern_tokens(pattern) {
            Ok(tokens) => self.trie.remove(&tokens, id).is_some(),
            Err(_) => false,
        }
    }

    /// Removes every subscription of connection `id`.
    pub fn remove_subscriber(&self, id: u64) -> usize {
        self.trie.remove_where(|s| s.id == id).len()
    }

    /// Removes subscriptions whose connection is unhealthy.
    pub fn sweep(&self) -> usize {
        let sink = &self.sink;
        self.trie
            .remove_where(|s| s.is_closed() || !sink.is_healthy(s.id))
            .len()
    }

    /// Publishes `payload` to `subject`.
    ///
    /// Every matching plain subscriber gets one copy and every matching
    /// queue group gets one copy, sent to a single member.
    ///
    /// # Errors
    ///
    /// Fails if the subject is malformed or contains wildcards.
    pub fn publish(&self, subject: &str, payload: Bytes) -> CoreResult<PublishReport> {
        let tokens = subject_tokens(subject)?;
        let matched = self.trie.matching(&tokens);

        let mut report = PublishReport::default();
        let mut groups: BTreeMap<String, Vec<Subscriber>> = BTreeMap::new();
        for sub in matched {
            match &sub.queue {
                Some(queue) => groups.entry(queue.clone()).or_default().push(sub),
                None => {
                    if self.is_usable(&sub) {
                        self.send(&sub, payload.clone(), &mut report);
                    }
                }
            }
        }

        for (queue, mut members) in groups {
            members.sort_by_key(|s| s.seq);
            if let Some(member) = self.pick(&queue, &members) {
                self.send(member, payload.clone(), &mut report);
            }
        }
        Ok(report)
    }

    fn is_usable(&self, sub: &Subscriber) -> bool {
        !sub.is_closed() && self.sink.is_healthy(sub.id)
    }

    fn next_counter(&self, queue: &str) -> u64 {
        match self.config.queue_balancing {
            QueueBalancing::Global => self.global_counter.fetch_add(1, Ordering::Relaxed),
            QueueBalancing::PerGroup => {
                let mut counters = self.group_counters.lock();
                let counter = counters.entry(queue.to_string()).or_insert(0);
                let current = *counter;
                *counter = counter.wrapping_add(1);
                current
            }
        }
    }

    /// Round-robin pick, moving on to the next member when one is unusable.
    fn pick<'a>(&self, queue: &str, members: &'a [Subscriber]) -> Option<&'a Subscriber> {
        let k = members.len();
        if k == 0 {
            return None;
        }
        let start = (self.next_counter(queue) % k as u64) as usize;
        (0..k)
            .map(|offset| &members[(start + offset) % k])
            .find(|s| self.is_usable(s))
    }

    fn send(&self, sub: &Subscriber, payload: Bytes, report: &mut PublishReport) {
        match sub.sender.try_send(payload) {
            Ok(()) => report.enqueued += 1,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                report.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Messages dropped because a subscriber's channel was full.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.trie.len()
    }

    /// Stops the sweep and closes every subscription.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
        let closed = self.trie.remove_where(|_| true).len();
        tracing::debug!(
            database = %self.database,
            collection = %self.collection,
            closed,
            "broker shut down"
        );
    }
}

impl std::fmt::Debug for BrokerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerEngine")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("subscriptions", &self.trie.len())
            .finish_non_exhaustive()
    }
}

async fn run_sweeper(engine: Weak<BrokerEngine>, mut stop: watch::Receiver<bool>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(engine) = engine.upgrade() else { break };
                let removed = engine.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "swept unhealthy subscribers");
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::delivery::RecordingSink;
    use std::time::Duration;

    fn engine(sink: Arc<RecordingSink>, config: BrokerConfig) -> Arc<BrokerEngine> {
        BrokerEngine::new("sys", "events", config, sink)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    #[tokio::test]
    async fn plain_subscribers_each_get_one_copy() {
        let sink = RecordingSink::new();
        let broker = engine(sink.clone(), BrokerConfig::default());
        broker.subscribe("foo.*.baz", 1, None).unwrap();
        broker.subscribe("foo.>", 2, None).unwrap();

        let report = broker.publish("foo.bar.baz", Bytes::from_static(b"m1")).unwrap();
        assert_eq!(report.enqueued, 2);
        broker.publish("foo.bar", Bytes::from_static(b"m2")).unwrap();
        settle().await;

        assert_eq!(sink.message_count(1), 1);
        assert_eq!(sink.message_count(2), 2);
        let first = sink.batches().into_iter().find(|(t, _)| t.subscriber_id == 1).unwrap();
        assert_eq!(first.0.subject, "foo.*.baz");
        assert_eq!(first.0.collection, "events");
    }

    #[tokio::test]
    async fn tail_wildcard_receives_bare_prefix() {
        let sink = RecordingSink::new();
        let broker = engine(sink.clone(), BrokerConfig::default());
        broker.subscribe("foo.>", 1, None).unwrap();
        broker.subscribe("foo.*", 2, None).unwrap();

        let report = broker.publish("foo", Bytes::from_static(b"m")).unwrap();
        assert_eq!(report.enqueued, 1);
        settle().await;

        assert_eq!(sink.message_count(1), 1);
        assert_eq!(sink.message_count(2), 0);
    }

    #[tokio::test]
    async fn queue_group_round_robin() {
        let sink = RecordingSink::new();
        let broker = engine(sink.clone(), BrokerConfig::default());
        for id in 1..=3 {
            broker.subscribe("jobs.run", id, Some("workers".into())).unwrap();
        }
        for i in 0..100u32 {
            let report = broker.publish("jobs.run", Bytes::from(i.to_be_bytes().to_vec())).unwrap();
            assert_eq!(report.enqueued, 1);
        }
        settle().await;

        let counts: Vec<usize> = (1..=3).map(|id| sink.message_count(id)).collect();
        assert_eq!(counts.iter().sum::<usize>(), 100);
        for c in counts {
            assert!(c.abs_diff(33) <= 1, "unbalanced: {c}");
        }
    }

    #[tokio::test]
    async fn queue_group_and_plain_subscriber_together() {
        let sink = RecordingSink::new();
        let broker = engine(sink.clone(), BrokerConfig::new().queue_balancing(QueueBalancing::PerGroup));
        broker.subscribe("a.b", 1, Some("g".into())).unwrap();
        broker.subscribe("a.*", 2, Some("g".into())).unwrap();
        broker.subscribe("a.b", 3, None).unwrap();

        for _ in 0..10 {
            broker.publish("a.b", Bytes::from_static(b"x")).unwrap();
        }
        settle().await;
        assert_eq!(sink.message_count(1) + sink.message_count(2), 10);
        assert_eq!(sink.message_count(1), 5);
        assert_eq!(sink.message_count(3), 10);
    }

    #[tokio::test]
    async fn full_channel_drops() {
        struct Stuck;
        impl DeliverySink for Stuck {
            fn deliver(&self, _: &DeliveryTarget, _: Vec<Bytes>) {}
        }

        let broker = BrokerEngine::new(
            "sys",
            "events",
            BrokerConfig::new().channel_capacity(2).batch_size(1000).batch_timeout(Duration::from_secs(60)),
            Arc::new(Stuck),
        );
        // current-thread runtime: the delivery task cannot drain until we yield
        broker.subscribe("s", 1, None).unwrap();
        let mut dropped = 0;
        for _ in 0..5 {
            dropped += broker.publish("s", Bytes::from_static(b"x")).unwrap().dropped;
        }
        assert_eq!(dropped, 3);
        assert_eq!(broker.dropped_messages(), 3);
    }

    #[tokio::test]
    async fn unsubscribe_and_disconnect() {
        let sink = RecordingSink::new();
        let broker = engine(sink.clone(), BrokerConfig::default());
        broker.subscribe("a", 1, None).unwrap();
        broker.subscribe("b", 1, None).unwrap();
        broker.subscribe("a", 2, None).unwrap();

        assert!(broker.unsubscribe("a", 2));
        assert!(!broker.unsubscribe("a", 2));
        assert_eq!(broker.remove_subscriber(1), 2);
        assert_eq!(broker.subscription_count(), 0);
        assert_eq!(broker.publish("a", Bytes::from_static(b"x")).unwrap().enqueued, 0);
    }

    #[tokio::test]
    async fn unhealthy_members_are_skipped_and_swept() {
        struct HalfDead(RecordingSink);
        impl DeliverySink for HalfDead {
            fn deliver(&self, target: &DeliveryTarget, messages: Vec<Bytes>) {
                self.0.deliver(target, messages);
            }
            fn is_healthy(&self, id: u64) -> bool {
                id != 2
            }
        }

        let sink = Arc::new(HalfDead(RecordingSink::default()));
        let broker = BrokerEngine::new("sys", "events", BrokerConfig::default(), sink.clone());
        broker.subscribe("q", 1, Some("g".into())).unwrap();
        broker.subscribe("q", 2, Some("g".into())).unwrap();
        for _ in 0..4 {
            broker.publish("q", Bytes::from_static(b"x")).unwrap();
        }
        settle().await;
        assert_eq!(sink.0.message_count(1), 4);
        assert_eq!(broker.sweep(), 1);
        assert_eq!(broker.subscription_count(), 1);
    }

    #[tokio::test]
    async fn publish_rejects_wildcards() {
        let broker = engine(RecordingSink::new(), BrokerConfig::default());
        assert!(broker.publish("a.*", Bytes::new()).is_err());
        assert!(broker.subscribe("a..b", 1, None).is_err());
    }
}
