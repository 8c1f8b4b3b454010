//! Client-side Multi-Paxos protocol for mutable blocks (OKB, ACB, GB):
//! `prepare -> accept -> confirm` against a quorum of `factor` peers,
//! plus the read-quorum protocol and quorum reconfiguration.

use std::sync::Arc;
use std::time::Duration;

use block_model::Block;
use dock::Peer;
use overlay::{majority, Overlay};
use shared_types::{Address, NodeId, Passport};
use telemetry::PAXOS_ROUNDS;
use tracing::{debug, warn};

use crate::errors::ConsensusError;
use crate::immutable::resolve_peer;
use crate::paxos::{Ballot, PaxosValue};
use crate::quorum::Quorum;
use crate::resolver::ConflictResolver;
use crate::rpc::{
    AcceptRequest, AcceptResponse, ConfirmRequest, PrepareRequest, PrepareResponse, ReadRequest,
    ReadResponse, METHOD_PAXOS_ACCEPT, METHOD_PAXOS_CONFIRM, METHOD_PAXOS_PREPARE,
    METHOD_PAXOS_READ,
};

/// How many times a write round retries after a ballot rejection before
/// giving up with [`ConsensusError::Unavailable`].
const MAX_BALLOT_RETRIES: u32 = 5;

async fn connect_quorum(
    overlay: &Arc<dyn Overlay>,
    dock: &Arc<dock::Dock>,
    members: &[NodeId],
) -> Vec<(NodeId, Peer)> {
    let mut peers = Vec::with_capacity(members.len());
    for &node_id in members {
        match resolve_peer(overlay, dock, node_id).await {
            Ok(peer) => peers.push((node_id, peer)),
            Err(err) => debug!(%node_id, %err, "quorum member unreachable"),
        }
    }
    peers
}

/// Find the quorum for `address`: either the one the overlay already
/// has an opinion on (a prior write/reconfiguration), or a fresh
/// allocation for a brand-new address.
async fn current_quorum(
    overlay: &Arc<dyn Overlay>,
    factor: usize,
    address: Address,
) -> Result<Quorum, ConsensusError> {
    let members = overlay.lookup(address, factor, false).await?;
    Ok(Quorum::new(members))
}

async fn run_prepare(
    peers: &[(NodeId, Peer)],
    passport: &Passport,
    call_timeout: Duration,
    address: Address,
    ballot: Ballot,
) -> Vec<PrepareResponse> {
    let mut responses = Vec::with_capacity(peers.len());
    for (node_id, peer) in peers {
        let payload = match bincode::serialize(&PrepareRequest { address, ballot }) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "failed to encode prepare request");
                continue;
            }
        };
        match peer
            .call(METHOD_PAXOS_PREPARE, passport.clone(), payload, call_timeout)
            .await
        {
            Ok(bytes) => match bincode::deserialize::<PrepareResponse>(&bytes) {
                Ok(resp) => responses.push(resp),
                Err(err) => debug!(%node_id, %err, "malformed prepare response"),
            },
            Err(err) => debug!(%node_id, %err, "prepare call failed"),
        }
    }
    responses
}

/// The outcome of asking `address`'s quorum to accept `value`.
struct AcceptOutcome {
    accepted: usize,
    /// Set once any acceptor reports the value itself as invalid
    /// (bad signature, non-monotonic version, writer missing from the
    /// ACL). No amount of ballot retrying fixes this, so the caller
    /// should give up rather than loop.
    invalid: bool,
}

async fn run_accept(
    peers: &[(NodeId, Peer)],
    passport: &Passport,
    call_timeout: Duration,
    address: Address,
    ballot: Ballot,
    value: PaxosValue,
) -> AcceptOutcome {
    let mut outcome = AcceptOutcome { accepted: 0, invalid: false };
    for (node_id, peer) in peers {
        let payload = match bincode::serialize(&AcceptRequest {
            address,
            ballot,
            value: value.clone(),
        }) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        match peer
            .call(METHOD_PAXOS_ACCEPT, passport.clone(), payload, call_timeout)
            .await
        {
            Ok(bytes) => match bincode::deserialize::<AcceptResponse>(&bytes) {
                Ok(AcceptResponse::Accepted) => outcome.accepted += 1,
                Ok(AcceptResponse::Rejected { .. }) => {}
                Ok(AcceptResponse::Invalid) => outcome.invalid = true,
                Err(err) => debug!(%node_id, %err, "malformed accept response"),
            },
            Err(err) => debug!(%node_id, %err, "accept call failed"),
        }
    }
    outcome
}

async fn run_confirm(
    peers: &[(NodeId, Peer)],
    passport: &Passport,
    call_timeout: Duration,
    address: Address,
    ballot: Ballot,
    value: PaxosValue,
) {
    for (_node_id, peer) in peers {
        let Ok(payload) = bincode::serialize(&ConfirmRequest {
            address,
            ballot,
            value: value.clone(),
        }) else {
            continue;
        };
        // Best-effort: a member that misses the confirm still has the
        // value as its highest *accepted* one, and will catch up on the
        // next prepare/read that reaches it.
        let _ = peer
            .call(METHOD_PAXOS_CONFIRM, passport.clone(), payload, call_timeout)
            .await;
    }
}

/// Run one full Paxos round (prepare, accept, confirm) proposing
/// `proposed` against `address`'s quorum, resolving ballot conflicts by
/// retrying with a higher counter. Returns the value Paxos actually
/// decided, which may differ from `proposed` if a concurrent writer's
/// value was already accepted at a higher ballot.
async fn run_round(
    overlay: &Arc<dyn Overlay>,
    dock: &Arc<dock::Dock>,
    passport: &Passport,
    call_timeout: Duration,
    address: Address,
    quorum: &Quorum,
    proposed: PaxosValue,
) -> Result<PaxosValue, ConsensusError> {
    let peers = connect_quorum(overlay, dock, &quorum.members).await;
    if peers.is_empty() {
        return Err(ConsensusError::Unavailable(address));
    }
    let needed = majority(quorum.len().max(1));

    let mut ballot = Ballot::initial(dock.node_id).next(dock.node_id);
    for attempt in 0..MAX_BALLOT_RETRIES {
        let prepared = run_prepare(&peers, passport, call_timeout, address, ballot).await;
        let promises = prepared
            .iter()
            .filter(|r| matches!(r, PrepareResponse::Promised { .. }))
            .count();

        if promises < needed {
            PAXOS_ROUNDS.with_label_values(&["prepare", "rejected"]).inc();
            let highest_rejected = prepared.iter().find_map(|r| match r {
                PrepareResponse::Rejected { promised } => Some(*promised),
                _ => None,
            });
            ballot = match highest_rejected {
                Some(higher) => higher.next(dock.node_id),
                None => ballot.next(dock.node_id),
            };
            continue;
        }
        PAXOS_ROUNDS.with_label_values(&["prepare", "promised"]).inc();

        let value_to_accept = prepared
            .iter()
            .filter_map(|r| match r {
                PrepareResponse::Promised { accepted: Some((b, v)), .. } => Some((*b, v.clone())),
                _ => None,
            })
            .max_by_key(|(b, _)| *b)
            .map(|(_, v)| v)
            .unwrap_or_else(|| proposed.clone());

        let outcome = run_accept(&peers, passport, call_timeout, address, ballot, value_to_accept.clone()).await;
        if outcome.invalid {
            PAXOS_ROUNDS.with_label_values(&["accept", "invalid"]).inc();
            return Err(ConsensusError::ValidationFailed(address));
        }
        if outcome.accepted < needed {
            PAXOS_ROUNDS.with_label_values(&["accept", "rejected"]).inc();
            ballot = ballot.next(dock.node_id);
            continue;
        }
        PAXOS_ROUNDS.with_label_values(&["accept", "accepted"]).inc();

        run_confirm(&peers, passport, call_timeout, address, ballot, value_to_accept.clone()).await;
        PAXOS_ROUNDS.with_label_values(&["confirm", "ok"]).inc();
        debug!(%address, attempt, "paxos round confirmed");
        return Ok(value_to_accept);
    }

    PAXOS_ROUNDS.with_label_values(&["prepare", "exhausted"]).inc();
    Err(ConsensusError::Unavailable(address))
}

/// Write (or create) a mutable block. Runs Paxos rounds until either
/// the caller's own value is decided, or a resolver reconciles a
/// concurrent writer's value and the retried round succeeds.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn write(
    overlay: &Arc<dyn Overlay>,
    dock: &Arc<dock::Dock>,
    passport: &Passport,
    factor: usize,
    call_timeout: Duration,
    mut block: Block,
    resolver: Option<Arc<dyn ConflictResolver>>,
) -> Result<Block, ConsensusError> {
    loop {
        let address = block.address();
        let quorum = current_quorum(overlay, factor, address).await?;
        let decided = run_round(
            overlay,
            dock,
            passport,
            call_timeout,
            address,
            &quorum,
            PaxosValue::Write(block.clone()),
        )
        .await?;

        let decided_block = match decided {
            PaxosValue::Write(b) => b,
            PaxosValue::Reconfigure(members) => {
                // A reconfiguration was in flight; it is now confirmed.
                // Retry our write against the new membership.
                debug!(%address, new_size = members.len(), "retried write observed a quorum reconfiguration");
                continue;
            }
        };

        if decided_block == block {
            return Ok(block);
        }

        // A concurrent writer's value won the ballot race.
        telemetry::CONSENSUS_CONFLICTS.inc();
        match &resolver {
            Some(resolver) => match resolver.resolve(&block, &decided_block) {
                Some(retry) => {
                    block = retry;
                    continue;
                }
                None => return Err(ConsensusError::Conflict { address }),
            },
            None => return Err(ConsensusError::Conflict { address }),
        }
    }
}

/// Read the current value at `address`. If `local_version` is given and
/// is already at least as high as the quorum's answer, returns `Ok(None)`
/// (no update) without transferring the block. Otherwise asks a majority
/// and, if they don't already agree, runs a no-op round to force
/// convergence before answering.
pub(crate) async fn read(
    overlay: &Arc<dyn Overlay>,
    dock: &Arc<dock::Dock>,
    passport: &Passport,
    factor: usize,
    call_timeout: Duration,
    address: Address,
    local_version: Option<u64>,
) -> Result<Option<Block>, ConsensusError> {
    let quorum = current_quorum(overlay, factor, address).await?;
    let peers = connect_quorum(overlay, dock, &quorum.members).await;
    if peers.is_empty() {
        return Err(ConsensusError::Unavailable(address));
    }
    let needed = majority(quorum.len().max(1));

    let mut answers = Vec::with_capacity(peers.len());
    for (node_id, peer) in &peers {
        let Ok(payload) = bincode::serialize(&ReadRequest { address, local_version }) else {
            continue;
        };
        match peer.call(METHOD_PAXOS_READ, passport.clone(), payload, call_timeout).await {
            Ok(bytes) => match bincode::deserialize::<ReadResponse>(&bytes) {
                Ok(resp) => answers.push(resp),
                Err(err) => debug!(%node_id, %err, "malformed read response"),
            },
            Err(err) => debug!(%node_id, %err, "read call failed"),
        }
    }

    if answers.len() < needed {
        return Err(ConsensusError::Unavailable(address));
    }
    if answers.iter().all(|a| matches!(a, ReadResponse::NoUpdate)) {
        return Ok(None);
    }

    let values: Vec<&PaxosValue> = answers
        .iter()
        .filter_map(|a| match a {
            ReadResponse::Value(Some(v)) => Some(v),
            _ => None,
        })
        .collect();

    if values.is_empty() {
        return Err(ConsensusError::MissingBlock(address));
    }

    // If every responder that had an opinion agrees, we're done.
    let first = values[0];
    if values.iter().all(|v| *v == first) {
        return match first {
            PaxosValue::Write(b) => Ok(Some(b.clone())),
            PaxosValue::Reconfigure(_) => Ok(None),
        };
    }

    // Disagreement: force convergence with a no-op round proposing
    // whatever the highest-versioned answer was, then return that.
    let converged = values
        .iter()
        .filter_map(|v| match v {
            PaxosValue::Write(b) => Some((*b).clone()),
            PaxosValue::Reconfigure(_) => None,
        })
        .max_by_key(|b| b.version().unwrap_or(0))
        .ok_or(ConsensusError::MissingBlock(address))?;

    let decided = run_round(
        overlay,
        dock,
        passport,
        call_timeout,
        address,
        &quorum,
        PaxosValue::Write(converged),
    )
    .await?;
    match decided {
        PaxosValue::Write(b) => Ok(Some(b)),
        PaxosValue::Reconfigure(_) => Ok(None),
    }
}

/// Propose a new quorum for `address`, dropping `dead` and adding
/// `replacement`. Runs through the same Paxos machinery as a block
/// write, just with a [`PaxosValue::Reconfigure`] payload, so it is
/// linearizable with any write racing for the same address.
pub(crate) async fn reconfigure(
    overlay: &Arc<dyn Overlay>,
    dock: &Arc<dock::Dock>,
    passport: &Passport,
    call_timeout: Duration,
    address: Address,
    current: &Quorum,
    dead: NodeId,
    replacement: NodeId,
) -> Result<Quorum, ConsensusError> {
    let proposed = current.replacing(dead, replacement);
    let decided = run_round(
        overlay,
        dock,
        passport,
        call_timeout,
        address,
        current,
        PaxosValue::Reconfigure(proposed.members.clone()),
    )
    .await?;
    telemetry::QUORUM_RECONFIGURATIONS.inc();
    match decided {
        PaxosValue::Reconfigure(members) => Ok(Quorum::new(members)),
        PaxosValue::Write(_) => {
            // A write raced ahead of us and got confirmed first; our
            // reconfiguration still needs to happen, so the caller
            // should retry against the (unchanged) current quorum.
            Ok(current.clone())
        }
    }
}
