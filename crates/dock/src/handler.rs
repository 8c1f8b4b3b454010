use async_trait::async_trait;
use shared_types::Passport;

use crate::errors::DockError;

/// The local side of an RPC: whatever consensus/model registers to
/// answer calls, whether they arrive in-process (a [`crate::peer::Peer::Local`])
/// or over the wire from a remote dialer. Implementations are
/// responsible for checking `passport.capabilities` against what
/// `method` requires; `Dock` only checks that the passport verifies.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, method: &str, passport: &Passport, payload: &[u8]) -> Result<Vec<u8>, DockError>;
}

/// A handler that answers every call with `UnknownRpc`. Useful as a
/// placeholder before the real consensus handler is wired in, and in
/// tests that only exercise the transport.
pub struct NullHandler;

#[async_trait]
impl RpcHandler for NullHandler {
    async fn handle(&self, method: &str, _passport: &Passport, _payload: &[u8]) -> Result<Vec<u8>, DockError> {
        Err(DockError::UnknownRpc(method.to_string()))
    }
}
