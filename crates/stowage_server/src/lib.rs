//! # Stowage Server
//!
//! TCP server for the Stowage storage service.
//!
//! This crate provides:
//! - The accept loop and per-connection reader/writer tasks
//! - Login with password or API key, and per-database permissions
//! - Handlers for system, registry, KV, object and broker commands
//! - An inactivity reaper and graceful shutdown
//!
//! # Architecture
//!
//! Every connection decodes frames into commands and hands them to the
//! [`Dispatcher`], which routes by command id. Collection commands resolve
//! their engine through the [`stowage_core::Catalog`] after the identity
//! and permission checks. Broker deliveries reach subscribers through the
//! same outbound queue as responses.
//!
//! # Example
//!
//! ```rust,no_run
//! use stowage_server::{Server, ServerConfig};
//!
//! # async fn run() -> stowage_server::ServerResult<()> {
//! let config = ServerConfig::from_env()?.with_data_dir("/var/lib/stowage");
//! let server = Server::bind(config).await?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod connection;
mod dispatch;
mod error;
mod handlers;
mod server;
mod state;

pub use auth::{require_user, Authenticator, LoginRequest, AUTH_API_KEY, AUTH_PASSWORD};
pub use config::{BootstrapAdmin, ServerConfig, DEFAULT_PORT};
pub use connection::{ConnectionContext, ConnectionMap, ConnectionSink, OUTBOUND_CAPACITY};
pub use dispatch::{error_response, Dispatcher, HandlerFault, HandlerFn};
pub use error::{ServerError, ServerResult};
pub use handlers::dispatcher;
pub use server::{Server, ShutdownHandle};
pub use state::ServerState;
