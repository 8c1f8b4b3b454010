//! What a caller reaches for when it wants to talk to a given node: a
//! [`Connection`] to a remote, or its own local handler when the
//! destination node *is* this process. Consensus holds `Peer`s rather
//! than `Connection`s directly so it never has to special-case "the
//! quorum member that happens to be me".

use std::sync::Arc;
use std::time::Duration;

use shared_types::{NodeId, Passport};

use crate::connection::Connection;
use crate::errors::DockError;
use crate::handler::RpcHandler;

/// One endpoint a [`crate::dock::Dock`] can route an RPC to.
#[derive(Clone)]
pub enum Peer {
    /// This node itself: the call is dispatched in-process against the
    /// locally registered handler, skipping the wire entirely.
    Local(Arc<dyn RpcHandler>),
    /// A remote node reached over an established [`Connection`].
    Remote(Arc<Connection>),
}

impl Peer {
    pub async fn call(
        &self,
        method: &str,
        passport: Passport,
        payload: Vec<u8>,
        call_timeout: Duration,
    ) -> Result<Vec<u8>, DockError> {
        match self {
            Peer::Local(handler) => handler.handle(method, &passport, &payload).await,
            Peer::Remote(conn) => conn.call(method, passport, payload, call_timeout).await,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Peer::Local(_))
    }

    /// The node id this peer resolves to, when known. `Local` callers
    /// generally already know their own id from the `Dock`; this is
    /// mostly useful for `Remote` peers surfaced by an overlay lookup.
    pub fn remote_node_id(&self) -> Option<NodeId> {
        match self {
            Peer::Local(_) => None,
            Peer::Remote(conn) => Some(conn.remote_node_id),
        }
    }
}

/// Send the same call to every peer in `peers` concurrently. Each slot
/// in the returned vector corresponds to the peer at the same index;
/// a peer that errors or times out still gets a slot, it just carries
/// an `Err`. Used by consensus to fan a prepare/accept out to a
/// quorum and tally whichever answers land within the deadline.
pub async fn broadcast(
    peers: &[Peer],
    method: &str,
    passport: Passport,
    payload: Vec<u8>,
    call_timeout: Duration,
) -> Vec<Result<Vec<u8>, DockError>> {
    let mut handles = Vec::with_capacity(peers.len());
    for peer in peers.iter().cloned() {
        let method = method.to_string();
        let passport = passport.clone();
        let payload = payload.clone();
        handles.push(tokio::spawn(async move {
            peer.call(&method, passport, payload, call_timeout).await
        }));
    }
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(err) => Err(DockError::Network(format!("broadcast task panicked: {err}"))),
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared_types::Capabilities;

    struct Echo;

    #[async_trait]
    impl RpcHandler for Echo {
        async fn handle(&self, method: &str, _passport: &Passport, payload: &[u8]) -> Result<Vec<u8>, DockError> {
            if method == "echo" {
                Ok(payload.to_vec())
            } else {
                Err(DockError::UnknownRpc(method.to_string()))
            }
        }
    }

    fn passport() -> Passport {
        Passport {
            user_key: [1u8; 32],
            network_name: "acme".into(),
            capabilities: Capabilities::OWNER,
            issuer_key: [1u8; 32],
            signature: [0u8; 64],
        }
    }

    #[tokio::test]
    async fn a_local_peer_dispatches_in_process() {
        let peer = Peer::Local(Arc::new(Echo));
        let got = peer.call("echo", passport(), b"hi".to_vec(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(got, b"hi");
        assert!(peer.is_local());
    }

    #[tokio::test]
    async fn broadcast_collects_one_result_per_peer() {
        let peers = vec![Peer::Local(Arc::new(Echo)), Peer::Local(Arc::new(Echo))];
        let results = broadcast(&peers, "echo", passport(), b"ping".to_vec(), Duration::from_secs(1)).await;
        assert_eq!(results.len(), 2);
        for r in results {
            assert_eq!(r.unwrap(), b"ping");
        }
    }

    #[tokio::test]
    async fn broadcast_reports_unknown_methods_per_slot() {
        let peers = vec![Peer::Local(Arc::new(Echo))];
        let results = broadcast(&peers, "nope", passport(), Vec::new(), Duration::from_secs(1)).await;
        assert!(matches!(results[0], Err(DockError::UnknownRpc(_))));
    }
}
