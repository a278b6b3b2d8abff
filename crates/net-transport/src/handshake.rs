//! Public key exchange over the raw stream
//!
//! One round, no framing: the initiator writes its 32-byte public key and
//! reads the responder's; the responder does the reverse. Nothing else is
//! sent in the clear.

use std::io;

use crypto_session::{CryptoSession, Direction, HandshakeBuilder, PUBLIC_KEY_SIZE, PeerPublicKey};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{ChannelConfig, TransportError, TransportResult};

/// Run the initiator side with a freshly generated key pair
pub async fn client_handshake<S>(
    stream: &mut S,
    config: &ChannelConfig,
) -> TransportResult<CryptoSession>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let builder = HandshakeBuilder::new_initiator()?;
    handshake(stream, builder, config).await
}

/// Run the responder side with a freshly generated key pair
pub async fn server_handshake<S>(
    stream: &mut S,
    config: &ChannelConfig,
) -> TransportResult<CryptoSession>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let builder = HandshakeBuilder::new_responder()?;
    handshake(stream, builder, config).await
}

/// Exchange public keys in the order given by the builder's direction
///
/// The whole exchange is bounded by `config.handshake_timeout`. A short read
/// or write leaves the connection unusable; it is reported as a handshake
/// failure and never retried.
pub async fn handshake<S>(
    stream: &mut S,
    builder: HandshakeBuilder,
    config: &ChannelConfig,
) -> TransportResult<CryptoSession>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let direction = builder.direction();

    let peer_public = tokio::time::timeout(
        config.handshake_timeout,
        exchange_public_keys(stream, &builder.public_key(), direction),
    )
    .await
    .map_err(|_| {
        TransportError::HandshakeFailure(format!(
            "timed out after {:?}",
            config.handshake_timeout
        ))
    })??;

    debug!(?direction, peer = %peer_public.fingerprint(), "Public keys exchanged");

    Ok(builder.complete(&peer_public)?)
}

async fn exchange_public_keys<S>(
    stream: &mut S,
    our_public: &[u8; PUBLIC_KEY_SIZE],
    direction: Direction,
) -> TransportResult<PeerPublicKey>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut their_public = [0u8; PUBLIC_KEY_SIZE];

    match direction {
        Direction::Initiator => {
            send_public_key(stream, our_public).await?;
            receive_public_key(stream, &mut their_public).await?;
        }
        Direction::Responder => {
            receive_public_key(stream, &mut their_public).await?;
            send_public_key(stream, our_public).await?;
        }
    }

    Ok(PeerPublicKey::from_bytes(their_public))
}

async fn send_public_key<S>(stream: &mut S, key: &[u8; PUBLIC_KEY_SIZE]) -> TransportResult<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(key)
        .await
        .map_err(|e| short_exchange(e, "write"))?;
    stream.flush().await?;
    Ok(())
}

async fn receive_public_key<S>(
    stream: &mut S,
    key: &mut [u8; PUBLIC_KEY_SIZE],
) -> TransportResult<()>
where
    S: AsyncRead + Unpin,
{
    stream
        .read_exact(key)
        .await
        .map_err(|e| short_exchange(e, "read"))?;
    Ok(())
}

fn short_exchange(err: io::Error, op: &str) -> TransportError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => TransportError::HandshakeFailure(
            format!("short {op} of the {PUBLIC_KEY_SIZE}-byte public key"),
        ),
        _ => TransportError::Io(err),
    }
}
