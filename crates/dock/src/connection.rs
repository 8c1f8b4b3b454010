//! A single multiplexed connection to a remote peer: calls this process
//! issues and calls the remote issues share one encrypted frame stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex as SyncMutex, RwLock};
use shared_crypto::symmetric::SecretKey;
use shared_types::{NodeId, Passport};
use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use overlay::PeerLocation;
use telemetry::{HistogramTimer, DOCK_CONNECTIONS, RPC_ATTEMPTS, RPC_DURATION};

use crate::errors::DockError;
use crate::framing::{read_encrypted_frame, write_encrypted_frame};
use crate::handler::RpcHandler;
use crate::handshake::{initiate, respond, HandshakeIdentity};
use crate::rpc::{Message, RpcRequest, RpcResponse, RpcStatus};

/// Lifecycle of a [`Connection`]. `Created` only exists before the
/// first `connect` attempt; once a socket has ever been live the
/// connection oscillates between `Connected` and `Disconnected` until
/// it is given up on and marked `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Connecting,
    Connected,
    Disconnected,
    Dead,
}

/// Exponential backoff schedule used by [`Connection::reconnect`]:
/// 200ms base, doubling, capped at 8 attempts.
pub const RECONNECT_BASE: Duration = Duration::from_millis(200);
pub const RECONNECT_MAX_ATTEMPTS: u32 = 8;

struct Outbound {
    writer: WriteHalf<TcpStream>,
    channel_key: SecretKey,
}

/// A live connection to a remote node. Shared (`Arc`'d) across every
/// overlay result and consensus client that currently wants to talk to
/// that node; the last `Arc` being dropped tears the socket down.
pub struct Connection {
    pub remote_node_id: NodeId,
    pub remote_passport: RwLock<Passport>,
    location: RwLock<PeerLocation>,
    state: RwLock<ConnectionState>,
    identity: Arc<HandshakeIdentity>,
    local_handler: Arc<dyn RpcHandler>,
    outbound: AsyncMutex<Option<Outbound>>,
    pending: SyncMutex<HashMap<u32, oneshot::Sender<RpcResponse>>>,
    next_channel: AtomicU32,
    reader_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Dial `location`, completing the handshake as initiator.
    /// `expected` pins the node id the caller expects to find there.
    pub async fn dial(
        location: PeerLocation,
        expected: Option<NodeId>,
        identity: Arc<HandshakeIdentity>,
        local_handler: Arc<dyn RpcHandler>,
        connect_timeout: Duration,
    ) -> Result<Arc<Self>, DockError> {
        let stream = timeout(connect_timeout, TcpStream::connect(location.to_string()))
            .await
            .map_err(|_| DockError::Timeout)??;
        let (outcome, read_half, write_half) = Self::handshake_as_initiator(stream, &identity, expected).await?;

        let conn = Arc::new(Self {
            remote_node_id: outcome.remote_node_id,
            remote_passport: RwLock::new(outcome.remote_passport),
            location: RwLock::new(location),
            state: RwLock::new(ConnectionState::Connected),
            identity,
            local_handler,
            outbound: AsyncMutex::new(Some(Outbound { writer: write_half, channel_key: SecretKey::from_bytes(outcome.channel_key) })),
            pending: SyncMutex::new(HashMap::new()),
            next_channel: AtomicU32::new(0),
            reader_task: SyncMutex::new(None),
        });
        conn.spawn_reader(read_half, SecretKey::from_bytes(outcome.channel_key));
        DOCK_CONNECTIONS.inc();
        Ok(conn)
    }

    /// Accept an inbound socket, completing the handshake as responder.
    pub async fn accept(
        stream: TcpStream,
        location: PeerLocation,
        identity: Arc<HandshakeIdentity>,
        local_handler: Arc<dyn RpcHandler>,
    ) -> Result<Arc<Self>, DockError> {
        let (read_half, write_half) = split(stream);
        let mut joined = JoinedStream { read: read_half, write: write_half };
        let outcome = respond(&mut joined, &identity).await?;
        let JoinedStream { read: read_half, write: write_half } = joined;

        let conn = Arc::new(Self {
            remote_node_id: outcome.remote_node_id,
            remote_passport: RwLock::new(outcome.remote_passport),
            location: RwLock::new(location),
            state: RwLock::new(ConnectionState::Connected),
            identity,
            local_handler,
            outbound: AsyncMutex::new(Some(Outbound { writer: write_half, channel_key: SecretKey::from_bytes(outcome.channel_key) })),
            pending: SyncMutex::new(HashMap::new()),
            next_channel: AtomicU32::new(0),
            reader_task: SyncMutex::new(None),
        });
        conn.spawn_reader(read_half, SecretKey::from_bytes(outcome.channel_key));
        DOCK_CONNECTIONS.inc();
        Ok(conn)
    }

    async fn handshake_as_initiator(
        stream: TcpStream,
        identity: &HandshakeIdentity,
        expected: Option<NodeId>,
    ) -> Result<(crate::handshake::HandshakeOutcome, ReadHalf<TcpStream>, WriteHalf<TcpStream>), DockError> {
        let (read_half, write_half) = split(stream);
        let mut joined = JoinedStream { read: read_half, write: write_half };
        let outcome = initiate(&mut joined, identity, expected).await?;
        let JoinedStream { read, write } = joined;
        Ok((outcome, read, write))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn location(&self) -> PeerLocation {
        self.location.read().clone()
    }

    fn spawn_reader(self: &Arc<Self>, mut read_half: ReadHalf<TcpStream>, channel_key: SecretKey) {
        let conn = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let frame = match read_encrypted_frame(&mut read_half, &channel_key).await {
                    Ok(frame) => frame,
                    Err(err) => {
                        debug!(peer = %conn.remote_node_id, %err, "connection reader exiting");
                        conn.mark_disconnected();
                        return;
                    }
                };
                let message: Message = match bincode::deserialize(&frame) {
                    Ok(m) => m,
                    Err(err) => {
                        warn!(peer = %conn.remote_node_id, %err, "dropping malformed frame");
                        continue;
                    }
                };
                match message {
                    Message::Response(response) => conn.complete_pending(response),
                    Message::Request(request) => {
                        let conn = Arc::clone(&conn);
                        tokio::spawn(async move { conn.serve_inbound(request).await });
                    }
                }
            }
        });
        *self.reader_task.lock() = Some(handle);
    }

    fn complete_pending(&self, response: RpcResponse) {
        if let Some(sender) = self.pending.lock().remove(&response.channel) {
            let _ = sender.send(response);
        }
    }

    async fn serve_inbound(self: Arc<Self>, request: RpcRequest) {
        let result = self.local_handler.handle(&request.method, &request.passport, &request.payload).await;
        let response = match result {
            Ok(payload) => RpcResponse { channel: request.channel, status: RpcStatus::Ok, payload },
            Err(DockError::UnknownRpc(method)) => RpcResponse { channel: request.channel, status: RpcStatus::UnknownRpc, payload: method.into_bytes() },
            Err(DockError::Refused(reason)) => RpcResponse { channel: request.channel, status: RpcStatus::Refused(reason), payload: Vec::new() },
            Err(err) => RpcResponse { channel: request.channel, status: RpcStatus::Error(err.to_string()), payload: Vec::new() },
        };
        if let Err(err) = self.send_message(&Message::Response(response)).await {
            debug!(peer = %self.remote_node_id, %err, "failed to answer inbound rpc");
        }
    }

    async fn send_message(&self, message: &Message) -> Result<(), DockError> {
        let bytes = bincode::serialize(message)?;
        let mut guard = self.outbound.lock().await;
        let outbound = guard.as_mut().ok_or(DockError::Closed)?;
        write_encrypted_frame(&mut outbound.writer, &outbound.channel_key, &bytes).await
    }

    /// Issue an RPC on a fresh channel and await its response.
    pub async fn call(&self, method: &str, passport: Passport, payload: Vec<u8>, call_timeout: Duration) -> Result<Vec<u8>, DockError> {
        if self.state() != ConnectionState::Connected {
            return Err(DockError::Closed);
        }
        let channel = self.next_channel.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(channel, tx);

        let _timer = HistogramTimer::new(&RPC_DURATION);
        let request = RpcRequest { channel, method: method.to_string(), passport, payload };
        if let Err(err) = self.send_message(&Message::Request(request)).await {
            self.pending.lock().remove(&channel);
            RPC_ATTEMPTS.with_label_values(&[method, "error"]).inc();
            return Err(err);
        }

        let outcome = match timeout(call_timeout, rx).await {
            Ok(Ok(response)) => Self::interpret(response),
            Ok(Err(_)) => Err(DockError::Closed),
            Err(_) => {
                self.pending.lock().remove(&channel);
                Err(DockError::Timeout)
            }
        };
        RPC_ATTEMPTS.with_label_values(&[method, if outcome.is_ok() { "ok" } else { "error" }]).inc();
        outcome
    }

    fn interpret(response: RpcResponse) -> Result<Vec<u8>, DockError> {
        match response.status {
            RpcStatus::Ok => Ok(response.payload),
            RpcStatus::UnknownRpc => Err(DockError::UnknownRpc(String::from_utf8_lossy(&response.payload).into_owned())),
            RpcStatus::Refused(reason) => Err(DockError::Refused(reason)),
            RpcStatus::Error(reason) => Err(DockError::Refused(reason)),
        }
    }

    fn mark_disconnected(&self) {
        let mut state = self.state.write();
        if *state != ConnectionState::Dead {
            *state = ConnectionState::Disconnected;
        }
        DOCK_CONNECTIONS.dec();
    }

    /// Tear down the socket and re-dial with exponential backoff,
    /// giving up (`Dead`) after [`RECONNECT_MAX_ATTEMPTS`].
    pub async fn reconnect(self: &Arc<Self>, connect_timeout: Duration) -> Result<(), DockError> {
        *self.state.write() = ConnectionState::Connecting;
        if let Some(handle) = self.reader_task.lock().take() {
            handle.abort();
        }
        *self.outbound.lock().await = None;

        let location = self.location();
        let mut delay = RECONNECT_BASE;
        for attempt in 0..RECONNECT_MAX_ATTEMPTS {
            match timeout(connect_timeout, TcpStream::connect(location.to_string())).await {
                Ok(Ok(stream)) => {
                    let (outcome, read_half, write_half) =
                        Self::handshake_as_initiator(stream, &self.identity, Some(self.remote_node_id)).await?;
                    *self.outbound.lock().await = Some(Outbound { writer: write_half, channel_key: SecretKey::from_bytes(outcome.channel_key) });
                    *self.remote_passport.write() = outcome.remote_passport;
                    *self.state.write() = ConnectionState::Connected;
                    self.spawn_reader_on(read_half, SecretKey::from_bytes(outcome.channel_key));
                    DOCK_CONNECTIONS.inc();
                    return Ok(());
                }
                _ => {
                    warn!(peer = %self.remote_node_id, attempt, "reconnect attempt failed");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        *self.state.write() = ConnectionState::Dead;
        Err(DockError::Network("exhausted reconnect attempts".into()))
    }

    fn spawn_reader_on(self: &Arc<Self>, read_half: ReadHalf<TcpStream>, channel_key: SecretKey) {
        self.spawn_reader(read_half, channel_key);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_task.lock().take() {
            handle.abort();
        }
        if self.state() == ConnectionState::Connected {
            DOCK_CONNECTIONS.dec();
        }
    }
}

/// Glue so the handshake (written against generic `AsyncRead +
/// AsyncWrite`) can run against a tokio-split stream before the reader
/// loop takes ownership of the read half.
struct JoinedStream {
    read: ReadHalf<TcpStream>,
    write: WriteHalf<TcpStream>,
}

impl AsyncRead for JoinedStream {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.read).poll_read(cx, buf)
    }
}

impl AsyncWrite for JoinedStream {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.write).poll_write(cx, buf)
    }

    fn poll_flush(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.write).poll_flush(cx)
    }

    fn poll_shutdown(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.write).poll_shutdown(cx)
    }
}
