//! Broker commands.
//!
//! Subscriptions belong to the issuing connection. Deliveries come back as
//! server-initiated commands (see [`stowage_protocol::BrokerDelivery`]).

use super::{resolve, Access};
use crate::connection::ConnectionContext;
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use bytes::Bytes;
use std::sync::Arc;
use stowage_core::broker::BrokerEngine;
use stowage_core::registry::EngineKind;
use stowage_protocol::ids::broker as id;
use stowage_protocol::{Command, PayloadReader, Response};

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher
        .register(id::SUBSCRIBE, subscribe)
        .register(id::SUBSCRIBE_QUEUE, subscribe)
        .register(id::UNSUBSCRIBE, unsubscribe)
        .register(id::PUBLISH, publish);
}

fn engine(
    state: &ServerState,
    conn: &ConnectionContext,
    cmd: &Command,
    access: Access,
) -> ServerResult<Arc<BrokerEngine>> {
    let engine = resolve(state, conn, cmd, access, EngineKind::Broker)?;
    engine
        .as_broker()
        .cloned()
        .ok_or_else(|| ServerError::Internal("engine kind changed".into()))
}

/// `u16 subject` or `u16 subject | u16 queue`
fn subscribe(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let broker = engine(state, conn, cmd, Access::Read)?;
    let mut reader = PayloadReader::new(&cmd.payload);
    let subject = reader.read_str16("subject")?;
    let queue = if cmd.id == id::SUBSCRIBE_QUEUE {
        let queue = reader.read_str16("queue")?;
        if queue.is_empty() {
            return Err(ServerError::bad_request("queue name must not be empty"));
        }
        Some(queue)
    } else {
        None
    };
    broker.subscribe(&subject, conn.id(), queue)?;
    Ok(Response::ok_empty())
}

fn unsubscribe(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let broker = engine(state, conn, cmd, Access::Read)?;
    let subject = PayloadReader::new(&cmd.payload).read_str16("subject")?;
    broker.unsubscribe(&subject, conn.id());
    Ok(Response::ok_empty())
}

/// `u16 subject | codex Binary`
fn publish(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let broker = engine(state, conn, cmd, Access::Write)?;
    let mut reader = PayloadReader::new(&cmd.payload);
    let subject = reader.read_str16("subject")?;
    let message = reader
        .read_value()?
        .into_binary()
        .ok_or_else(|| ServerError::bad_request("message must be binary"))?;
    let report = broker.publish(&subject, Bytes::from(message))?;
    if report.dropped > 0 {
        tracing::debug!(conn_id = conn.id(), subject = %subject, dropped = report.dropped, "publish dropped messages");
    }
    Ok(Response::ok_empty())
}
