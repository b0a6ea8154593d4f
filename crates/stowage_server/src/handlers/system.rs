//! Ping, protocol versions, login and auth status.

use crate::auth::{require_user, LoginRequest};
use crate::connection::ConnectionContext;
use crate::dispatch::Dispatcher;
use crate::error::ServerResult;
use crate::state::ServerState;
use bytes::{BufMut, BytesMut};
use stowage_protocol::{ids, Command, Response, Status, SUPPORTED_VERSIONS};

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher
        .register(ids::PING, ping)
        .register(ids::SUPPORTED_PROTOCOL_VERSIONS, supported_versions)
        .register(ids::LOGIN, login)
        .register(ids::AUTH_STATUS, auth_status);
}

fn ping(_: &ServerState, _: &ConnectionContext, _: &Command) -> ServerResult<Response> {
    Ok(Response::text(Status::Ok, "pong"))
}

/// `u8 count | u8 versions[count]`
fn supported_versions(_: &ServerState, _: &ConnectionContext, _: &Command) -> ServerResult<Response> {
    let mut buf = BytesMut::with_capacity(1 + SUPPORTED_VERSIONS.len());
    buf.put_u8(SUPPORTED_VERSIONS.len() as u8);
    buf.put_slice(SUPPORTED_VERSIONS);
    Ok(Response::ok(buf.freeze()))
}

fn login(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let request = LoginRequest::parse(&cmd.payload)?;
    state.authenticator().login(conn, &request)?;
    Ok(Response::ok_empty())
}

fn auth_status(_: &ServerState, conn: &ConnectionContext, _: &Command) -> ServerResult<Response> {
    require_user(conn)?;
    Ok(Response::ok_empty())
}
