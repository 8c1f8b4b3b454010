//! Challenge/response handshake run once per connection, before any
//! [`crate::rpc::Message`] is exchanged.
//!
//! Each side proves it holds the private key behind its passport's
//! `user_key` by signing a transcript of both nonces; the transcript
//! also seeds a channel key via BLAKE3 key derivation.
//!
//! Caveat, worth spelling out: `shared-crypto` has no asymmetric
//! key-agreement primitive (no X25519/ECDH), only Ed25519 signing and
//! symmetric AEAD. Nonces and public keys travel in the clear during
//! the handshake, so a passive observer of the wire can recompute the
//! same channel key. What this handshake buys is mutual proof of
//! passport possession and per-connection key separation (a replayed
//! transcript from connection A never produces connection B's key) —
//! not confidentiality against a network eavesdropper. Closing that gap
//! needs an ECDH step added to `shared-crypto`.

use serde::{Deserialize, Serialize};
use shared_crypto::hashing::blake3_derive_key;
use shared_crypto::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_types::{NodeId, Passport, PublicKey, Signature};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::DockError;
use crate::framing::{read_frame, write_frame};
use crate::rpc::PROTOCOL_VERSION;

const CHANNEL_KEY_CONTEXT: &str = "memoria dock channel key v1";

/// Identity a [`crate::dock::Dock`] presents during every handshake it
/// takes part in, as either initiator or responder.
pub struct HandshakeIdentity {
    pub node_id: NodeId,
    pub identity: Ed25519KeyPair,
    pub passport: Passport,
    pub network_owner: PublicKey,
}

/// What a successful handshake establishes about the peer on the other
/// end of the wire.
pub struct HandshakeOutcome {
    pub remote_node_id: NodeId,
    pub remote_passport: Passport,
    pub channel_key: [u8; 32],
}

#[derive(Serialize, Deserialize)]
struct Hello {
    node_id: NodeId,
    passport: Passport,
    nonce: [u8; 32],
    protocol_version: u16,
}

#[derive(Serialize, Deserialize)]
struct Ack {
    node_id: NodeId,
    passport: Passport,
    nonce: [u8; 32],
    protocol_version: u16,
    signature: Signature,
}

#[derive(Serialize, Deserialize)]
struct Confirm {
    signature: Signature,
}

fn transcript(nonce_a: &[u8; 32], nonce_b: &[u8; 32], key_a: &PublicKey, key_b: &PublicKey) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + 32 + 32 + 32);
    buf.extend_from_slice(nonce_a);
    buf.extend_from_slice(nonce_b);
    buf.extend_from_slice(key_a);
    buf.extend_from_slice(key_b);
    buf
}

fn channel_key(transcript: &[u8]) -> [u8; 32] {
    blake3_derive_key(CHANNEL_KEY_CONTEXT, transcript)
}

fn verify_signature(user_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<(), DockError> {
    let key = Ed25519PublicKey::from_bytes(*user_key)
        .map_err(|e| DockError::Handshake(format!("malformed peer key: {e}")))?;
    key.verify(message, &Ed25519Signature::from_bytes(*signature))
        .map_err(|_| DockError::Handshake("transcript signature did not verify".into()))
}

fn random_nonce() -> [u8; 32] {
    use rand::RngCore;
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Run the initiator side of the handshake over an already-connected
/// stream. `expected` pins the remote node id when the caller dialed a
/// specific peer (as opposed to an anonymous bootstrap connection).
pub async fn initiate<S: AsyncReadExt + AsyncWriteExt + Unpin>(
    stream: &mut S,
    local: &HandshakeIdentity,
    expected: Option<NodeId>,
) -> Result<HandshakeOutcome, DockError> {
    let nonce_i = random_nonce();
    let hello = Hello {
        node_id: local.node_id,
        passport: local.passport.clone(),
        nonce: nonce_i,
        protocol_version: PROTOCOL_VERSION,
    };
    write_frame(stream, &bincode::serialize(&hello)?).await?;

    let ack: Ack = bincode::deserialize(&read_frame(stream).await?)?;
    if ack.protocol_version != PROTOCOL_VERSION {
        return Err(DockError::VersionMismatch { ours: PROTOCOL_VERSION, theirs: ack.protocol_version });
    }
    if let Some(expected_id) = expected {
        if expected_id != ack.node_id {
            return Err(DockError::Handshake("responder identity did not match the dialed node".into()));
        }
    }
    if !ack.passport.verify(&local.network_owner) {
        return Err(DockError::Handshake("responder passport does not verify".into()));
    }

    let transcript_bytes = transcript(&nonce_i, &ack.nonce, &local.passport.user_key, &ack.passport.user_key);
    verify_signature(&ack.passport.user_key, &transcript_bytes, &ack.signature)?;

    let confirm = Confirm { signature: *local.identity.sign(&transcript_bytes).as_bytes() };
    write_frame(stream, &bincode::serialize(&confirm)?).await?;

    Ok(HandshakeOutcome {
        remote_node_id: ack.node_id,
        remote_passport: ack.passport,
        channel_key: channel_key(&transcript_bytes),
    })
}

/// Run the responder side of the handshake over a freshly accepted
/// stream.
pub async fn respond<S: AsyncReadExt + AsyncWriteExt + Unpin>(
    stream: &mut S,
    local: &HandshakeIdentity,
) -> Result<HandshakeOutcome, DockError> {
    let hello: Hello = bincode::deserialize(&read_frame(stream).await?)?;
    if hello.protocol_version != PROTOCOL_VERSION {
        return Err(DockError::VersionMismatch { ours: PROTOCOL_VERSION, theirs: hello.protocol_version });
    }
    if !hello.passport.verify(&local.network_owner) {
        return Err(DockError::Handshake("initiator passport does not verify".into()));
    }

    let nonce_r = random_nonce();
    let transcript_bytes = transcript(&hello.nonce, &nonce_r, &hello.passport.user_key, &local.passport.user_key);
    let signature = *local.identity.sign(&transcript_bytes).as_bytes();

    let ack = Ack {
        node_id: local.node_id,
        passport: local.passport.clone(),
        nonce: nonce_r,
        protocol_version: PROTOCOL_VERSION,
        signature,
    };
    write_frame(stream, &bincode::serialize(&ack)?).await?;

    let confirm: Confirm = bincode::deserialize(&read_frame(stream).await?)?;
    verify_signature(&hello.passport.user_key, &transcript_bytes, &confirm.signature)?;

    Ok(HandshakeOutcome {
        remote_node_id: hello.node_id,
        remote_passport: hello.passport,
        channel_key: channel_key(&transcript_bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Capabilities;

    fn identity(node_id: u8, network_owner: &Ed25519KeyPair) -> HandshakeIdentity {
        let keys = Ed25519KeyPair::from_seed([node_id; 32]);
        let mut passport = Passport {
            user_key: *keys.public_key().as_bytes(),
            network_name: "acme".into(),
            capabilities: Capabilities::OWNER,
            issuer_key: *network_owner.public_key().as_bytes(),
            signature: [0u8; 64],
        };
        passport.signature = *network_owner.sign(&passport.signing_bytes()).as_bytes();
        HandshakeIdentity {
            node_id: NodeId([node_id; 32]),
            identity: keys,
            passport,
            network_owner: *network_owner.public_key().as_bytes(),
        }
    }

    #[tokio::test]
    async fn initiator_and_responder_agree_on_a_channel_key() {
        let network_owner = Ed25519KeyPair::from_seed([9u8; 32]);
        let alice = identity(1, &network_owner);
        let bob = identity(2, &network_owner);

        let (mut client, mut server) = tokio::io::duplex(8192);
        let bob_node_id = bob.node_id;
        let server_task = tokio::spawn(async move { respond(&mut server, &bob).await });

        let client_outcome = initiate(&mut client, &alice, Some(bob_node_id)).await.unwrap();
        let server_outcome = server_task.await.unwrap().unwrap();

        assert_eq!(client_outcome.channel_key, server_outcome.channel_key);
        assert_eq!(server_outcome.remote_node_id, NodeId([1u8; 32]));
    }

    #[tokio::test]
    async fn mismatched_expected_node_id_is_rejected() {
        let network_owner = Ed25519KeyPair::from_seed([9u8; 32]);
        let alice = identity(1, &network_owner);
        let bob = identity(2, &network_owner);

        let (mut client, mut server) = tokio::io::duplex(8192);
        tokio::spawn(async move {
            let _ = respond(&mut server, &bob).await;
        });

        let wrong_id = NodeId([77u8; 32]);
        let result = initiate(&mut client, &alice, Some(wrong_id)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn a_passport_issued_by_a_different_owner_is_rejected() {
        let network_owner = Ed25519KeyPair::from_seed([9u8; 32]);
        let other_owner = Ed25519KeyPair::from_seed([100u8; 32]);
        let alice = identity(1, &other_owner);
        let bob = identity(2, &network_owner);

        let (mut client, mut server) = tokio::io::duplex(8192);
        let server_task = tokio::spawn(async move { respond(&mut server, &bob).await });

        let _ = initiate(&mut client, &alice, None).await;
        assert!(server_task.await.unwrap().is_err());
    }
}
