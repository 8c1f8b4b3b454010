//! Client-side protocol for immutable blocks (CHB, NB, UB): replicate
//! to a majority on insert, walk owners in order on fetch, broadcast
//! on remove.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use block_model::{Block, RemoveSignature};
use dock::{DockError, Peer};
use overlay::{majority, Overlay, PeerLocation};
use shared_types::{Address, NodeId, Passport, PublicKey};
use tracing::{debug, warn};

use crate::errors::ConsensusError;
use crate::rpc::{
    FetchImmutableRequest, FetchImmutableResponse, RemoveImmutableRequest, StoreImmutableRequest,
    METHOD_FETCH_IMMUTABLE, METHOD_REMOVE_IMMUTABLE, METHOD_STORE_IMMUTABLE,
};

pub(crate) async fn resolve_peer(
    overlay: &Arc<dyn Overlay>,
    dock: &Arc<dock::Dock>,
    node_id: NodeId,
) -> Result<Peer, ConsensusError> {
    if node_id == dock.node_id {
        return Ok(dock.local_peer());
    }
    let location: PeerLocation = overlay.lookup_node(node_id).await?;
    Ok(dock.make_peer(node_id, location).await?)
}

/// Store `block` on `factor` peers drawn from the overlay's allocation
/// for its address; succeeds once at least a majority ack. A peer
/// refusal for any reason other than a content collision draws one more
/// peer from the overlay and retries on it, per §4.5.1 step 3 — a
/// collision needs no replacement peer since every other replica is
/// expected to refuse the same write for the same reason.
pub(crate) async fn insert(
    overlay: &Arc<dyn Overlay>,
    dock: &Arc<dock::Dock>,
    passport: &Passport,
    factor: usize,
    call_timeout: Duration,
    block: Block,
) -> Result<(), ConsensusError> {
    let address = block.address();
    let needed = majority(factor.max(1));
    let payload = bincode::serialize(&StoreImmutableRequest { block })
        .map_err(|e| ConsensusError::Network(e.to_string()))?;

    let mut tried: HashSet<NodeId> = HashSet::new();
    let mut acked = 0usize;
    let mut pool_size = factor;

    loop {
        let owners = match overlay.allocate(address, pool_size).await {
            Ok(owners) => owners,
            Err(err) if pool_size > factor => {
                debug!(%err, "overlay has no additional immutable replica to draw");
                break;
            }
            Err(err) => return Err(err.into()),
        };
        let fresh: Vec<NodeId> = owners.into_iter().filter(|id| tried.insert(*id)).collect();
        if fresh.is_empty() {
            break;
        }

        let mut non_collision_refusal = false;
        for node_id in &fresh {
            let peer = match resolve_peer(overlay, dock, *node_id).await {
                Ok(peer) => peer,
                Err(err) => {
                    debug!(%node_id, %err, "could not reach immutable replica");
                    continue;
                }
            };
            match peer.call(METHOD_STORE_IMMUTABLE, passport.clone(), payload.clone(), call_timeout).await {
                Ok(_) => acked += 1,
                Err(DockError::Refused(reason)) if reason == "collision" => {
                    warn!(%node_id, "peer refused immutable store: collision");
                }
                Err(DockError::Refused(reason)) => {
                    warn!(%node_id, %reason, "peer refused immutable store; drawing a fresh replica");
                    non_collision_refusal = true;
                }
                Err(err) => debug!(%node_id, %err, "immutable store call failed"),
            }
        }

        if acked >= needed || !non_collision_refusal {
            break;
        }
        pool_size += 1;
    }

    if acked >= needed {
        Ok(())
    } else {
        Err(ConsensusError::Unavailable(address))
    }
}

/// Ask the overlay for the owners of `address` and try them in order
/// until one answers.
pub(crate) async fn fetch(
    overlay: &Arc<dyn Overlay>,
    dock: &Arc<dock::Dock>,
    passport: &Passport,
    factor: usize,
    call_timeout: Duration,
    address: Address,
) -> Result<Block, ConsensusError> {
    let owners = overlay.lookup(address, factor, false).await?;
    let payload = bincode::serialize(&FetchImmutableRequest { address })
        .map_err(|e| ConsensusError::Network(e.to_string()))?;

    for node_id in &owners {
        let peer = match resolve_peer(overlay, dock, *node_id).await {
            Ok(peer) => peer,
            Err(_) => continue,
        };
        match peer.call(METHOD_FETCH_IMMUTABLE, passport.clone(), payload.clone(), call_timeout).await {
            Ok(bytes) => {
                let response: FetchImmutableResponse =
                    bincode::deserialize(&bytes).map_err(|e| ConsensusError::Network(e.to_string()))?;
                return Ok(response.block);
            }
            Err(err) => debug!(%node_id, %err, "owner did not answer immutable fetch"),
        }
    }
    Err(ConsensusError::MissingBlock(address))
}

/// Broadcast a removal to every owner the overlay knows about;
/// `MissingBlock` on an individual peer is not an error (it may simply
/// never have held a copy).
pub(crate) async fn remove(
    overlay: &Arc<dyn Overlay>,
    dock: &Arc<dock::Dock>,
    passport: &Passport,
    factor: usize,
    call_timeout: Duration,
    address: Address,
    signature: RemoveSignature,
    signer_key: Option<PublicKey>,
) -> Result<(), ConsensusError> {
    let owners = overlay.lookup(address, factor, false).await?;
    let payload = bincode::serialize(&RemoveImmutableRequest {
        signature,
        signer_key: signer_key.unwrap_or([0u8; 32]),
    })
    .map_err(|e| ConsensusError::Network(e.to_string()))?;

    for node_id in &owners {
        let peer = match resolve_peer(overlay, dock, *node_id).await {
            Ok(peer) => peer,
            Err(_) => continue,
        };
        match peer.call(METHOD_REMOVE_IMMUTABLE, passport.clone(), payload.clone(), call_timeout).await {
            Ok(_) => {}
            Err(DockError::Refused(reason)) if reason.contains("missing") => {}
            Err(err) => debug!(%node_id, %err, "immutable remove call failed"),
        }
    }
    Ok(())
}
