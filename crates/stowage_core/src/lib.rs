//! # Stowage Core
//!
//! Storage engines and metadata for the Stowage server.
//!
//! - [`kv`]: sharded in-memory key-value store with TTL
//! - [`object`]: sharded append-log object store with CRC-verified reads
//! - [`broker`]: subject-routed pub/sub with wildcards and queue groups
//! - [`registry`]: databases, collections and per-database permissions
//! - [`users`]: user identities and credential checks
//! - [`Catalog`]: keeps one engine per registered collection
//!
//! The engines are protocol-agnostic; the server maps commands onto them.
//!
//! ## Example
//!
//! ```rust
//! use stowage_core::kv::KvEngine;
//! use stowage_core::KvConfig;
//! use stowage_codec::Value;
//!
//! let kv = KvEngine::new(KvConfig::new().disable_ttl(true));
//! kv.set("greeting", Value::from("hello"), 0);
//! assert_eq!(kv.get("greeting"), Some(Value::from("hello")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
mod catalog;
mod clock;
mod config;
mod dir;
mod error;
pub mod kv;
pub mod object;
pub mod registry;
mod shard;
pub mod users;

pub use catalog::{require_kind, Catalog, CatalogConfig, Engine};
pub use clock::{now_millis, now_nanos};
pub use config::{BrokerConfig, KvConfig, ObjectConfig, QueueBalancing};
pub use dir::DataDir;
pub use error::{CoreError, CoreResult};
pub use shard::{fnv1a32, shard_of};
