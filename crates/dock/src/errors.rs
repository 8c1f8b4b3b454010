use thiserror::Error;

/// Errors surfaced by the connection pool, the wire codec, and the
/// handshake. Consensus retries on [`DockError::Network`] and
/// [`DockError::Timeout`]; everything else is terminal for the call.
#[derive(Debug, Error)]
pub enum DockError {
    #[error("connection to peer failed: {0}")]
    Network(String),

    #[error("rpc call timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("peer does not support rpc method {0:?}")]
    UnknownRpc(String),

    #[error("peer refused the call: {0}")]
    Refused(String),

    #[error("unsupported protocol version (ours {ours}, theirs {theirs})")]
    VersionMismatch { ours: u16, theirs: u16 },

    #[error("frame exceeds maximum size ({0} bytes)")]
    FrameTooLarge(usize),

    #[error("wire codec error: {0}")]
    Codec(String),
}

impl From<std::io::Error> for DockError {
    fn from(e: std::io::Error) -> Self {
        DockError::Network(e.to_string())
    }
}

impl From<bincode::Error> for DockError {
    fn from(e: bincode::Error) -> Self {
        DockError::Codec(e.to_string())
    }
}
