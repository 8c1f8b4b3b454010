//! Length-prefixed frames over any async byte stream: a 4-byte
//! big-endian length followed by that many bytes of bincode-encoded
//! payload. One connection carries a single frame stream; the payload
//! itself discriminates request vs. response (see [`crate::rpc::Message`]).

use shared_crypto::symmetric::{decrypt, encrypt, Nonce, SecretKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::DockError;

/// Frames larger than this are rejected before we allocate a buffer for
/// them, so a corrupt or hostile length prefix cannot exhaust memory.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<(), DockError> {
    if bytes.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(DockError::FrameTooLarge(bytes.len()));
    }
    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, DockError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(DockError::FrameTooLarge(len as usize));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a frame whose payload is encrypted under the connection's
/// channel key: a 24-byte nonce followed by the AEAD ciphertext.
pub async fn write_encrypted_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    key: &SecretKey,
    plaintext: &[u8],
) -> Result<(), DockError> {
    let (ciphertext, nonce) = encrypt(key, plaintext).map_err(|e| DockError::Codec(e.to_string()))?;
    let mut framed = Vec::with_capacity(24 + ciphertext.len());
    framed.extend_from_slice(nonce.as_bytes());
    framed.extend_from_slice(&ciphertext);
    write_frame(writer, &framed).await
}

pub async fn read_encrypted_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    key: &SecretKey,
) -> Result<Vec<u8>, DockError> {
    let framed = read_frame(reader).await?;
    if framed.len() < 24 {
        return Err(DockError::Codec("encrypted frame shorter than its nonce".into()));
    }
    let (nonce_bytes, ciphertext) = framed.split_at(24);
    let mut nonce_array = [0u8; 24];
    nonce_array.copy_from_slice(nonce_bytes);
    decrypt(key, ciphertext, &Nonce::from_bytes(nonce_array)).map_err(|e| DockError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encrypted_frames_round_trip_under_the_same_key() {
        let key = SecretKey::generate();
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_encrypted_frame(&mut client, &key, b"paxos prepare").await.unwrap();
        let got = read_encrypted_frame(&mut server, &key).await.unwrap();
        assert_eq!(got, b"paxos prepare");
    }

    #[tokio::test]
    async fn encrypted_frames_fail_under_the_wrong_key() {
        let key = SecretKey::generate();
        let other = SecretKey::generate();
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_encrypted_frame(&mut client, &key, b"paxos prepare").await.unwrap();
        assert!(read_encrypted_frame(&mut server, &other).await.is_err());
    }

    #[tokio::test]
    async fn round_trips_a_frame_through_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_frame(&mut client, b"hello").await.unwrap();
        let got = read_frame(&mut server).await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn rejects_a_frame_over_the_size_limit() {
        let (mut client, _server) = tokio::io::duplex(64);
        let oversized = vec![0u8; MAX_FRAME_LEN as usize + 1];
        let err = write_frame(&mut client, &oversized).await.unwrap_err();
        assert!(matches!(err, DockError::FrameTooLarge(_)));
    }
}
