//! # Stowage Client
//!
//! Async reference client for the Stowage storage service.
//!
//! This crate provides:
//! - A pipelined connection with a response listener
//! - Routing of broker deliveries to per-subject [`Subscription`]s
//! - A heartbeat ping every 10 seconds by default
//! - Typed helpers for system, registry, KV, object and broker commands
//!
//! ## Example
//!
//! ```rust,no_run
//! use stowage_client::Client;
//! use stowage_codec::Value;
//!
//! # async fn run() -> stowage_client::ClientResult<()> {
//! let client = Client::connect_to("127.0.0.1:8091".parse().unwrap()).await?;
//! client.login("oliver", "hello").await?;
//!
//! let kv = client.kv("sys", "cache");
//! kv.set("greeting", &Value::from("hi")).await?;
//! assert_eq!(kv.get("greeting").await?, Some(Value::from("hi")));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod client;
mod config;
mod error;
mod kv;
mod object;
mod registry;

pub use broker::{Broker, Subscription};
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_HEARTBEAT};
pub use error::{ClientError, ClientResult};
pub use kv::{deadline_after, Kv};
pub use object::{ObjectInfo, Objects};
pub use registry::{CollectionInfo, DatabaseInfo, Engine, Registry, FLAG_DISABLE_TTL};
