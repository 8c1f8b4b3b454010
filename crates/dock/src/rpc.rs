//! Wire messages carried over a connection's frame stream once the
//! handshake has completed.

use serde::{Deserialize, Serialize};
use shared_types::Passport;

/// Protocol version stamp negotiated at handshake. Bumped whenever a
/// serialization-affecting change lands; a peer that cannot match it
/// refuses the connection with [`crate::errors::DockError::VersionMismatch`].
pub const PROTOCOL_VERSION: u16 = 1;

/// One multiplexed call or its answer. Both directions of a connection
/// share the same frame stream, so every frame is tagged as one or the
/// other.
#[derive(Debug, Serialize, Deserialize)]
pub enum Message {
    Request(RpcRequest),
    Response(RpcResponse),
}

/// A call on channel `channel`. The passport travels with every call
/// (not just at handshake) so a responder can re-check capabilities
/// per-method, e.g. refusing a write call on a read-only passport even
/// over an already-authenticated connection.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub channel: u32,
    pub method: String,
    pub passport: Passport,
    pub payload: Vec<u8>,
}

/// The answer to a [`RpcRequest`] with a matching `channel`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub channel: u32,
    pub status: RpcStatus,
    pub payload: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RpcStatus {
    Ok,
    UnknownRpc,
    Refused(String),
    Error(String),
}
