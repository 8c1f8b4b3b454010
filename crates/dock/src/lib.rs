//! Per-process connection pool: the passport-gated handshake, the
//! channel-multiplexed encrypted frame protocol, and the `Peer`
//! abstraction consensus and the overlay lookup results are expressed
//! in terms of.

pub mod connection;
pub mod dock;
pub mod errors;
pub mod framing;
pub mod handler;
pub mod handshake;
pub mod peer;
pub mod rpc;

pub use connection::{Connection, ConnectionState};
pub use dock::Dock;
pub use errors::DockError;
pub use handler::{NullHandler, RpcHandler};
pub use handshake::HandshakeIdentity;
pub use peer::{broadcast, Peer};
pub use rpc::{Message, RpcRequest, RpcResponse, RpcStatus, PROTOCOL_VERSION};
