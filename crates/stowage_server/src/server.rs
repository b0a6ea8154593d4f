//! TCP server.
//!
//! One task accepts connections. Each connection gets a reader task that
//! decodes and dispatches commands, and a writer task that drains the
//! connection's outbound queue. A reaper closes connections that stay
//! silent past the inactivity timeout.

use crate::config::ServerConfig;
use crate::connection::ConnectionContext;
use crate::dispatch::{Dispatcher, HandlerFault};
use crate::error::{ServerError, ServerResult};
use crate::handlers;
use crate::state::ServerState;
use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use stowage_core::now_millis;
use stowage_protocol::{
    checked_len, read_frame, write_frame, BufferPool, Command, Message, MessageType, ProtocolError,
    Response, Status,
};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Read buffers kept for reuse across connections.
const POOLED_BUFFERS: usize = 64;

/// Stops a running [`Server`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Asks the server to stop accepting and close every connection.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// The Stowage server.
pub struct Server {
    state: Arc<ServerState>,
    dispatcher: Arc<Dispatcher>,
    listener: TcpListener,
    pool: Arc<BufferPool>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Opens the server state and binds the listener.
    ///
    /// # Errors
    ///
    /// Fails if the state cannot be opened (see [`ServerState::open`]) or
    /// the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let addr = config.bind_addr;
        let state = ServerState::open(config)?;
        let listener = TcpListener::bind(addr).await?;
        let (shutdown, _) = watch::channel(false);
        tracing::info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            state,
            dispatcher: Arc::new(handlers::dispatcher()),
            listener,
            pool: Arc::new(BufferPool::new(POOLED_BUFFERS)),
            shutdown: Arc::new(shutdown),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared state.
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Handle that stops [`Server::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    /// Runs until `signal` completes, then shuts down.
    pub async fn run_until(self, signal: impl Future<Output = ()> + Send + 'static) -> ServerResult<()> {
        let handle = self.shutdown_handle();
        tokio::spawn(async move {
            signal.await;
            handle.shutdown();
        });
        self.run().await
    }

    /// Accepts connections until shut down.
    ///
    /// # Errors
    ///
    /// Currently only fails if the shutdown channel is lost.
    pub async fn run(self) -> ServerResult<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let reaper = spawn_reaper(Arc::clone(&self.state), self.shutdown.subscribe());
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        workers.retain(|w| !w.is_finished());
                        workers.push(tokio::spawn(serve_connection(
                            Arc::clone(&self.state),
                            Arc::clone(&self.dispatcher),
                            Arc::clone(&self.pool),
                            stream,
                            peer,
                            self.shutdown.subscribe(),
                        )));
                    }
                    Err(err) => tracing::warn!(error = %err, "accept failed"),
                },
            }
        }

        tracing::info!(connections = self.state.connections().len(), "shutting down");
        self.state.connections().close_all();
        for worker in workers {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "connection task failed");
            }
        }
        reaper.abort();
        self.state.catalog().shutdown();
        tracing::info!("server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}

fn spawn_reaper(state: Arc<ServerState>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let every = state.config().reaper_interval;
    let timeout = state.config().inactivity_timeout;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = state.connections().reap_idle(now_millis(), timeout);
                    for id in &reaped {
                        tracing::info!(conn_id = id, "closing inactive connection");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

async fn serve_connection(
    state: Arc<ServerState>,
    dispatcher: Arc<Dispatcher>,
    pool: Arc<BufferPool>,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(error = %err, "cannot set TCP_NODELAY");
    }
    let id = state.connections().next_id();
    let (conn, outbound) = ConnectionContext::new(id, peer);
    state.connections().register(Arc::clone(&conn));
    tracing::debug!(conn_id = id, peer = %peer, "connection opened");

    let (reader, writer) = stream.into_split();
    let writer_task = tokio::spawn(write_loop(writer, outbound, conn.closed_signal()));

    let mut buf = pool.get();
    let result = read_loop(&state, &dispatcher, &conn, reader, &mut buf, shutdown).await;
    pool.put(buf);

    conn.close();
    state.connections().deregister(id);
    let subscriptions = state.catalog().remove_subscriber(id);
    match writer_task.await {
        Ok(Err(err)) if !err.is_eof() => tracing::debug!(conn_id = id, error = %err, "write failed"),
        Err(err) => tracing::warn!(conn_id = id, error = %err, "writer task failed"),
        _ => {}
    }
    match result {
        Ok(()) => tracing::debug!(conn_id = id, subscriptions, "connection closed"),
        Err(err) => tracing::debug!(conn_id = id, subscriptions, error = %err, "connection dropped"),
    }
}

async fn read_loop(
    state: &Arc<ServerState>,
    dispatcher: &Dispatcher,
    conn: &Arc<ConnectionContext>,
    reader: OwnedReadHalf,
    buf: &mut bytes::BytesMut,
    mut shutdown: watch::Receiver<bool>,
) -> ServerResult<()> {
    let mut reader = BufReader::new(reader);
    let mut closed = conn.closed_signal();

    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, buf) => frame,
            _ = closed.changed() => return Ok(()),
            _ = shutdown.changed() => return Ok(()),
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) if err.is_eof() => return Ok(()),
            Err(err @ ProtocolError::FrameLengthInvalid(_)) => {
                respond(conn, &Response::text(Status::InvalidMessage, &err.to_string())).await;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        conn.touch();

        let message = match Message::decode(&frame) {
            Ok(message) if message.message_type == MessageType::Command => message,
            Ok(_) => {
                respond(conn, &Response::text(Status::InvalidMessage, "expected a command")).await;
                continue;
            }
            Err(err) => {
                respond(conn, &Response::text(Status::InvalidMessage, &err.to_string())).await;
                continue;
            }
        };
        let cmd = match Command::decode(&message.payload) {
            Ok(cmd) => cmd,
            Err(err) => {
                respond(conn, &Response::bad_request(&err.to_string())).await;
                continue;
            }
        };

        match dispatcher.dispatch(state, conn, cmd).await {
            Ok(response) => {
                if !respond(conn, &response).await {
                    return Ok(());
                }
            }
            Err(HandlerFault) => {
                respond(conn, &Response::status(Status::InternalServerError)).await;
                return Err(ServerError::Internal("handler fault".into()));
            }
        }
    }
}

async fn respond(conn: &ConnectionContext, response: &Response) -> bool {
    let encoded = response.into_message().encode();
    if checked_len(encoded.len()).is_ok() {
        return conn.send(encoded).await;
    }
    tracing::warn!(
        conn_id = conn.id(),
        len = encoded.len(),
        status = %response.status,
        "response exceeds frame cap"
    );
    let fallback = Response::text(Status::InternalServerError, "response too large");
    conn.send(fallback.into_message().encode()).await
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Bytes>,
    mut closed: watch::Receiver<bool>,
) -> Result<(), ProtocolError> {
    loop {
        let is_closed = *closed.borrow();
        if is_closed {
            break;
        }
        tokio::select! {
            biased;
            message = outbound.recv() => match message {
                Some(message) => write_or_skip(&mut writer, &message).await?,
                None => return Ok(()),
            },
            changed = closed.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    while let Ok(message) = outbound.try_recv() {
        write_or_skip(&mut writer, &message).await?;
    }
    writer.shutdown().await?;
    Ok(())
}

/// Writes one frame. An oversized frame is dropped before any byte of it
/// reaches the socket, so the stream stays in sync.
async fn write_or_skip(writer: &mut OwnedWriteHalf, message: &[u8]) -> Result<(), ProtocolError> {
    match write_frame(writer, message).await {
        Err(ProtocolError::FrameLengthInvalid(len)) => {
            tracing::warn!(len, "outbound frame exceeds cap, dropped");
            Ok(())
        }
        other => other,
    }
}
