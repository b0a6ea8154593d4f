//! Command routing.
//!
//! Handlers are plain functions keyed by command id. Handlers that touch
//! object files are registered as blocking and run on tokio's blocking
//! pool; everything else runs inline on the connection task. A panicking
//! handler is reported as a [`HandlerFault`] so the connection can be
//! closed after an `InternalServerError` reply.

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use crate::connection::ConnectionContext;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use stowage_protocol::{Command, Response};

/// Signature of a command handler.
pub type HandlerFn = fn(&ServerState, &ConnectionContext, &Command) -> ServerResult<Response>;

#[derive(Clone, Copy)]
struct Route {
    handler: HandlerFn,
    blocking: bool,
}

/// A handler panicked; the connection must be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerFault;

/// Maps command ids to handlers.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<u16, Route>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler that runs on the connection task.
    pub fn register(&mut self, id: u16, handler: HandlerFn) -> &mut Self {
        self.routes.insert(id, Route { handler, blocking: false });
        self
    }

    /// Registers a handler that runs on the blocking pool.
    pub fn register_blocking(&mut self, id: u16, handler: HandlerFn) -> &mut Self {
        self.routes.insert(id, Route { handler, blocking: true });
        self
    }

    /// Registers `handler` for every id in `ids`.
    pub fn register_all(&mut self, ids: &[u16], handler: HandlerFn) -> &mut Self {
        for id in ids {
            self.register(*id, handler);
        }
        self
    }

    /// Returns true if `id` has a handler.
    pub fn contains(&self, id: u16) -> bool {
        self.routes.contains_key(&id)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs the handler for `cmd` and converts its outcome into a response.
    ///
    /// # Errors
    ///
    /// [`HandlerFault`] if the handler panicked.
    pub async fn dispatch(
        &self,
        state: &Arc<ServerState>,
        conn: &Arc<ConnectionContext>,
        cmd: Command,
    ) -> Result<Response, HandlerFault> {
        let started = Instant::now();
        let Some(route) = self.routes.get(&cmd.id).copied() else {
            tracing::debug!(conn_id = conn.id(), command_id = cmd.id, "unknown command");
            return Ok(error_response(&ServerError::CommandNotFound(cmd.id)));
        };

        let outcome = if route.blocking {
            let state = Arc::clone(state);
            let conn_for_task = Arc::clone(conn);
            let cmd_for_task = cmd.clone();
            tokio::task::spawn_blocking(move || {
                (route.handler)(&state, &conn_for_task, &cmd_for_task)
            })
            .await
            .map_err(|err| {
                tracing::error!(conn_id = conn.id(), command_id = cmd.id, error = %err, "blocking handler failed");
                HandlerFault
            })?
        } else {
            catch_unwind(AssertUnwindSafe(|| (route.handler)(state, conn, &cmd))).map_err(|_| {
                tracing::error!(conn_id = conn.id(), command_id = cmd.id, "handler panicked");
                HandlerFault
            })?
        };

        let elapsed_us = started.elapsed().as_micros() as u64;
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(
                        conn_id = conn.id(),
                        command_id = cmd.id,
                        database = %cmd.database,
                        collection = %cmd.collection,
                        error = %err,
                        "command failed"
                    );
                }
                error_response(&err)
            }
        };
        tracing::debug!(
            conn_id = conn.id(),
            command_id = cmd.id,
            database = %cmd.database,
            collection = %cmd.collection,
            status = response.status.code(),
            elapsed_us,
            "command handled"
        );
        Ok(response)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// Builds the response for a failed command.
pub fn error_response(err: &ServerError) -> Response {
    Response::text(err.status(), &err.client_message())
}
