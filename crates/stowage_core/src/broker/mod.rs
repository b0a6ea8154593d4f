//! Broker engine.
//!
//! Subjects are dot-separated tokens. Patterns may use `*` for one token and
//! a trailing `>` for any remaining tokens. Subscriptions live in a trie with
//! per-node locks; publishes walk it without ever holding two node locks.

mod delivery;
mod engine;
pub mod subject;
mod trie;

pub use delivery::{DeliverySink, DeliveryTarget, RecordingSink};
pub use engine::{BrokerEngine, PublishReport};
pub use trie::Subscriber;
