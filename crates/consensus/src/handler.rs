//! The server side of the consensus RPC surface: what a node answers
//! when another peer (or itself, via [`dock::Peer::Local`]) calls in.
//!
//! Owns the local silo (for immutable blocks and for the durable copy
//! of whatever a mutable Paxos round decides) and the per-address
//! acceptor bookkeeping for Multi-Paxos.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use block_model::{wire, BlockError};
use dock::{DockError, RpcHandler};
use parking_lot::Mutex;
use shared_bus::{EventBus, LifecycleEvent};
use shared_types::{Address, Passport};
use silo::Silo;
use tracing::{debug, warn};

use crate::paxos::{AcceptorTable, Ballot, PaxosValue};
use crate::rpc::{
    AcceptRequest, AcceptResponse, ConfirmRequest, FetchImmutableRequest, FetchImmutableResponse,
    PrepareRequest, PrepareResponse, ReadRequest, ReadResponse, RemoveImmutableRequest,
    StoreImmutableRequest, METHOD_FETCH_IMMUTABLE, METHOD_PAXOS_ACCEPT, METHOD_PAXOS_CONFIRM,
    METHOD_PAXOS_PREPARE, METHOD_PAXOS_READ, METHOD_REMOVE_IMMUTABLE, METHOD_STORE_IMMUTABLE,
};

fn require_write(passport: &Passport) -> Result<(), DockError> {
    if passport.capabilities.allow_write {
        Ok(())
    } else {
        Err(DockError::Refused("passport lacks write capability".into()))
    }
}

fn require_storage(passport: &Passport) -> Result<(), DockError> {
    if passport.capabilities.allow_storage {
        Ok(())
    } else {
        Err(DockError::Refused("passport lacks storage capability".into()))
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, DockError> {
    bincode::serialize(value).map_err(|e| DockError::Codec(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, DockError> {
    bincode::deserialize(bytes).map_err(|e| DockError::Codec(e.to_string()))
}

/// Registers under the method names in [`crate::rpc`] and answers them
/// against a local silo and a local Paxos acceptor table.
pub struct ConsensusHandler {
    silo: Arc<dyn Silo>,
    acceptors: AcceptorTable,
    bus: Arc<EventBus>,
    /// Addresses this node has been reconfigured out of. A prepare or
    /// accept for one of these answers `Unavailable` rather than
    /// quietly keeping stale state alive forever.
    evicted: Mutex<HashSet<Address>>,
}

impl ConsensusHandler {
    pub fn new(silo: Arc<dyn Silo>, bus: Arc<EventBus>) -> Self {
        Self {
            silo,
            acceptors: AcceptorTable::new(),
            bus,
            evicted: Mutex::new(HashSet::new()),
        }
    }

    async fn store_immutable(&self, passport: &Passport, payload: &[u8]) -> Result<Vec<u8>, DockError> {
        require_storage(passport)?;
        let request: StoreImmutableRequest = decode(payload)?;
        let address = request.block.address();
        request
            .block
            .validate()
            .map_err(|e| DockError::Refused(format!("validation failed: {e}")))?;

        let bytes = wire::encode(&request.block).map_err(|e| DockError::Codec(e.to_string()))?;
        match self.silo.set(address, bytes.clone(), true, false).await {
            Ok(_) => {
                self.bus.publish(LifecycleEvent::Stored { address, version: None });
                Ok(Vec::new())
            }
            Err(silo::SiloError::Collision(_)) => {
                // Immutable insert is idempotent: only a no-op if the
                // content actually matches what's already there.
                match self.silo.get(address).await {
                    Ok(existing) if existing == bytes => Ok(Vec::new()),
                    _ => Err(DockError::Refused("collision".into())),
                }
            }
            Err(err) => Err(DockError::Refused(err.to_string())),
        }
    }

    async fn fetch_immutable(&self, payload: &[u8]) -> Result<Vec<u8>, DockError> {
        let request: FetchImmutableRequest = decode(payload)?;
        let bytes = self
            .silo
            .get(request.address)
            .await
            .map_err(|_| DockError::Refused("missing".into()))?;
        let block = wire::decode(&bytes).map_err(|e| DockError::Codec(e.to_string()))?;
        self.bus.publish(LifecycleEvent::Fetched { address: request.address });
        encode(&FetchImmutableResponse { block })
    }

    async fn remove_immutable(&self, passport: &Passport, payload: &[u8]) -> Result<Vec<u8>, DockError> {
        require_write(passport)?;
        let request: RemoveImmutableRequest = decode(payload)?;
        let bytes = match self.silo.get(request.signature.address).await {
            Ok(bytes) => bytes,
            Err(_) => return Ok(Vec::new()), // never held a copy; not an error
        };
        let block = wire::decode(&bytes).map_err(|e| DockError::Codec(e.to_string()))?;
        let signer_key = if request.signer_key == [0u8; 32] { None } else { Some(request.signer_key) };
        block
            .verify_remove_authorization(&request.signature, signer_key)
            .map_err(|_| DockError::Refused("remove signature invalid".into()))?;
        self.silo
            .erase(request.signature.address)
            .await
            .map_err(|e| DockError::Refused(e.to_string()))?;
        self.bus.publish(LifecycleEvent::Removed { address: request.signature.address });
        Ok(Vec::new())
    }

    async fn paxos_prepare(&self, payload: &[u8]) -> Result<Vec<u8>, DockError> {
        let request: PrepareRequest = decode(payload)?;
        if self.evicted.lock().contains(&request.address) {
            return encode(&PrepareResponse::Unavailable);
        }
        let record = self.acceptors.entry(request.address);
        let mut record = record.lock().await;

        if let Some(promised) = record.promised {
            if request.ballot <= promised {
                return encode(&PrepareResponse::Rejected { promised });
            }
        }
        record.promised = Some(request.ballot);
        encode(&PrepareResponse::Promised {
            accepted: record.accepted.clone(),
            decided: record.decided.clone(),
        })
    }

    async fn paxos_accept(&self, payload: &[u8]) -> Result<Vec<u8>, DockError> {
        let request: AcceptRequest = decode(payload)?;
        if self.evicted.lock().contains(&request.address) {
            return encode(&AcceptResponse::Rejected { promised: request.ballot });
        }
        let record = self.acceptors.entry(request.address);
        let mut record = record.lock().await;

        if let Some(promised) = record.promised {
            if request.ballot < promised {
                return encode(&AcceptResponse::Rejected { promised });
            }
        }

        if let PaxosValue::Write(ref block) = request.value {
            match block.validate_against(record.decided_block()) {
                Ok(()) => {}
                // The proposal lost the race to a version already
                // decided here; hand the caller that decided value back
                // so its own conflict/resolver machinery (the same path
                // a ballot-level race takes) can reconcile it, instead
                // of treating a stale writer as unauthorized.
                Err(BlockError::VersionNotMonotonic { .. }) => {
                    return encode(&AcceptResponse::Stale { decided: record.decided.clone() });
                }
                Err(err) => {
                    debug!(address = %request.address, %err, "rejecting unauthorized or malformed paxos write");
                    return encode(&AcceptResponse::Invalid);
                }
            }
        }

        record.promised = Some(request.ballot);
        record.accepted = Some((request.ballot, request.value));
        encode(&AcceptResponse::Accepted)
    }

    async fn paxos_confirm(&self, passport: &Passport, payload: &[u8]) -> Result<Vec<u8>, DockError> {
        require_write(passport)?;
        let request: ConfirmRequest = decode(payload)?;
        let record = self.acceptors.entry(request.address);
        let mut record = record.lock().await;
        record.decided = Some(request.value.clone());

        match request.value {
            PaxosValue::Write(block) => {
                let bytes = wire::encode(&block).map_err(|e| DockError::Codec(e.to_string()))?;
                if let Err(err) = self.silo.set(request.address, bytes, true, true).await {
                    warn!(%err, address = %request.address, "failed to persist confirmed paxos value");
                }
                self.bus.publish(LifecycleEvent::Stored {
                    address: request.address,
                    version: block.version(),
                });
            }
            PaxosValue::Reconfigure(members) => {
                debug!(address = %request.address, size = members.len(), "quorum reconfigured");
            }
        }
        Ok(Vec::new())
    }

    async fn paxos_read(&self, payload: &[u8]) -> Result<Vec<u8>, DockError> {
        let request: ReadRequest = decode(payload)?;
        let record = self.acceptors.entry(request.address);
        let record = record.lock().await;

        if let (Some(local_version), Some(decided)) = (request.local_version, &record.decided) {
            if let Some(block) = decided.as_block() {
                if let Some(v) = block.version() {
                    if v <= local_version {
                        return encode(&ReadResponse::NoUpdate);
                    }
                }
            }
        }
        encode(&ReadResponse::Value(record.decided.clone()))
    }

    /// Mark this node evicted from `address`'s quorum; a subsequent
    /// prepare/accept answers `Unavailable` instead of participating.
    pub fn evict(&self, address: Address) {
        self.evicted.lock().insert(address);
    }
}

#[async_trait]
impl RpcHandler for ConsensusHandler {
    async fn handle(&self, method: &str, passport: &Passport, payload: &[u8]) -> Result<Vec<u8>, DockError> {
        match method {
            METHOD_STORE_IMMUTABLE => self.store_immutable(passport, payload).await,
            METHOD_FETCH_IMMUTABLE => self.fetch_immutable(payload).await,
            METHOD_REMOVE_IMMUTABLE => self.remove_immutable(passport, payload).await,
            METHOD_PAXOS_PREPARE => self.paxos_prepare(payload).await,
            METHOD_PAXOS_ACCEPT => self.paxos_accept(payload).await,
            METHOD_PAXOS_CONFIRM => self.paxos_confirm(passport, payload).await,
            METHOD_PAXOS_READ => self.paxos_read(payload).await,
            other => Err(DockError::UnknownRpc(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_model::{Block, Chb};
    use shared_types::{Address, Capabilities};
    use silo::Memory;

    fn owner_passport() -> Passport {
        Passport {
            user_key: [1u8; 32],
            network_name: "acme".into(),
            capabilities: Capabilities::OWNER,
            issuer_key: [1u8; 32],
            signature: [0u8; 64],
        }
    }

    fn read_only_passport() -> Passport {
        Passport {
            user_key: [1u8; 32],
            network_name: "acme".into(),
            capabilities: Capabilities::READ_ONLY,
            issuer_key: [1u8; 32],
            signature: [0u8; 64],
        }
    }

    fn handler() -> ConsensusHandler {
        let silo: Arc<dyn Silo> = Arc::new(Memory::new(shared_types::NodeId([0u8; 32])));
        ConsensusHandler::new(silo, Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn store_then_fetch_round_trips_a_chb() {
        let handler = handler();
        let chb = Block::Chb(Chb::new(b"hello".to_vec(), Address::NULL));
        let store_payload = bincode::serialize(&StoreImmutableRequest { block: chb.clone() }).unwrap();
        handler
            .handle(METHOD_STORE_IMMUTABLE, &owner_passport(), &store_payload)
            .await
            .unwrap();

        let fetch_payload = bincode::serialize(&FetchImmutableRequest { address: chb.address() }).unwrap();
        let response = handler
            .handle(METHOD_FETCH_IMMUTABLE, &owner_passport(), &fetch_payload)
            .await
            .unwrap();
        let response: FetchImmutableResponse = bincode::deserialize(&response).unwrap();
        assert_eq!(response.block, chb);
    }

    #[tokio::test]
    async fn repeated_store_of_the_same_content_is_idempotent() {
        let handler = handler();
        let chb = Block::Chb(Chb::new(b"hello".to_vec(), Address::NULL));
        let payload = bincode::serialize(&StoreImmutableRequest { block: chb }).unwrap();
        handler.handle(METHOD_STORE_IMMUTABLE, &owner_passport(), &payload).await.unwrap();
        handler.handle(METHOD_STORE_IMMUTABLE, &owner_passport(), &payload).await.unwrap();
    }

    #[tokio::test]
    async fn write_without_capability_is_refused() {
        let handler = handler();
        let chb = Block::Chb(Chb::new(b"hello".to_vec(), Address::NULL));
        let payload = bincode::serialize(&StoreImmutableRequest { block: chb }).unwrap();
        let err = handler
            .handle(METHOD_STORE_IMMUTABLE, &read_only_passport(), &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, DockError::Refused(_)));
    }

    #[tokio::test]
    async fn second_prepare_with_a_lower_ballot_is_rejected() {
        let handler = handler();
        let address = Address::random(true);
        let node = shared_types::NodeId([1u8; 32]);
        let high = Ballot { counter: 5, proposer: node };
        let low = Ballot { counter: 1, proposer: node };

        let payload = bincode::serialize(&PrepareRequest { address, ballot: high }).unwrap();
        handler.handle(METHOD_PAXOS_PREPARE, &owner_passport(), &payload).await.unwrap();

        let payload = bincode::serialize(&PrepareRequest { address, ballot: low }).unwrap();
        let response = handler.handle(METHOD_PAXOS_PREPARE, &owner_passport(), &payload).await.unwrap();
        let response: PrepareResponse = bincode::deserialize(&response).unwrap();
        assert!(matches!(response, PrepareResponse::Rejected { promised } if promised == high));
    }

    #[tokio::test]
    async fn evicted_address_answers_unavailable() {
        let handler = handler();
        let address = Address::random(true);
        handler.evict(address);
        let ballot = Ballot::initial(shared_types::NodeId([1u8; 32]));
        let payload = bincode::serialize(&PrepareRequest { address, ballot }).unwrap();
        let response = handler.handle(METHOD_PAXOS_PREPARE, &owner_passport(), &payload).await.unwrap();
        let response: PrepareResponse = bincode::deserialize(&response).unwrap();
        assert!(matches!(response, PrepareResponse::Unavailable));
    }
}
