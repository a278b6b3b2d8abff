//! Encrypted duplex stream and the client-side dial

use bytes::Bytes;
use crypto_session::{CryptoSession, HandshakeBuilder, PeerPublicKey};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::{
    ChannelConfig, SecureReader, SecureWriter, TransportResult, client_handshake, handshake,
    server_handshake,
};

/// A byte stream wrapped in a completed handshake
///
/// Only constructed after the public keys have been exchanged, so no frame
/// can be sent or accepted before the session exists.
pub struct SecureStream<S> {
    reader: SecureReader<ReadHalf<S>>,
    writer: SecureWriter<WriteHalf<S>>,
    peer_public: PeerPublicKey,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SecureStream<S> {
    /// Perform the initiator handshake on `stream`
    pub async fn connect(mut stream: S, config: &ChannelConfig) -> TransportResult<Self> {
        config.validate()?;
        let session = client_handshake(&mut stream, config).await?;
        Ok(Self::from_session(stream, session, config))
    }

    /// Perform the responder handshake on `stream`
    pub async fn accept(mut stream: S, config: &ChannelConfig) -> TransportResult<Self> {
        config.validate()?;
        let session = server_handshake(&mut stream, config).await?;
        Ok(Self::from_session(stream, session, config))
    }

    /// Perform the handshake prepared by `builder`, in its direction
    pub async fn handshake_with(
        mut stream: S,
        builder: HandshakeBuilder,
        config: &ChannelConfig,
    ) -> TransportResult<Self> {
        config.validate()?;
        let session = handshake(&mut stream, builder, config).await?;
        Ok(Self::from_session(stream, session, config))
    }

    fn from_session(stream: S, session: CryptoSession, config: &ChannelConfig) -> Self {
        let peer_public = *session.peer_public_key();
        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            reader: SecureReader::new(read_half, session.clone(), config),
            writer: SecureWriter::new(write_half, session, config),
            peer_public,
        }
    }

    /// Read decrypted bytes; `Ok(0)` at end of stream
    pub async fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        self.reader.read(buf).await
    }

    /// Read the next whole frame; `None` at end of stream
    pub async fn read_frame(&mut self) -> TransportResult<Option<Bytes>> {
        self.reader.read_frame().await
    }

    /// Send `plaintext` as one encrypted frame
    pub async fn write(&mut self, plaintext: &[u8]) -> TransportResult<usize> {
        self.writer.write(plaintext).await
    }

    pub async fn shutdown(&mut self) -> TransportResult<()> {
        self.writer.shutdown().await
    }

    pub fn peer_public_key(&self) -> &PeerPublicKey {
        &self.peer_public
    }

    pub fn max_frame_size(&self) -> usize {
        self.writer.max_frame_size()
    }

    /// Separate the halves so they can be driven from different tasks
    pub fn into_split(self) -> (SecureReader<ReadHalf<S>>, SecureWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}

/// Connect to `addr` and run the client handshake with default settings
pub async fn dial<A: ToSocketAddrs>(addr: A) -> TransportResult<SecureStream<TcpStream>> {
    dial_with_config(addr, &ChannelConfig::default()).await
}

/// Connect to `addr` and run the client handshake
pub async fn dial_with_config<A: ToSocketAddrs>(
    addr: A,
    config: &ChannelConfig,
) -> TransportResult<SecureStream<TcpStream>> {
    config.validate()?;

    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let remote = stream.peer_addr()?;
    debug!(%remote, "Connected, starting handshake");

    let secure = SecureStream::connect(stream, config).await?;
    info!(
        %remote,
        peer = %secure.peer_public_key().fingerprint(),
        "Secure channel established"
    );

    Ok(secure)
}

#[cfg(test)]
mod tests {
    use tokio::io::{DuplexStream, duplex};

    use super::*;
    use crate::TransportError;

    type DuplexPair = (SecureStream<DuplexStream>, SecureStream<DuplexStream>);

    async fn connected_pair(config: ChannelConfig) -> DuplexPair {
        let (client_io, server_io) = duplex(4096);
        let server_config = config.clone();
        let server =
            tokio::spawn(async move { SecureStream::accept(server_io, &server_config).await });
        let client = SecureStream::connect(client_io, &config).await.unwrap();
        (client, server.await.unwrap().unwrap())
    }

    #[tokio::test]
    async fn test_duplex_round_trip() {
        let (mut client, mut server) = connected_pair(ChannelConfig::default()).await;

        assert_eq!(client.write(b"ping").await.unwrap(), 4);
        assert_eq!(server.read_frame().await.unwrap().unwrap(), &b"ping"[..]);

        server.write(b"pong").await.unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");

        assert_eq!(client.peer_public_key(), server.writer.session().local_public_key());
    }

    #[tokio::test]
    async fn test_boundary_frame_sizes() {
        let config = ChannelConfig::default().with_max_frame_size(1024);
        let (mut client, mut server) = connected_pair(config).await;

        let largest = vec![7u8; 1024];
        client.write(&largest).await.unwrap();
        assert_eq!(server.read_frame().await.unwrap().unwrap(), largest);

        let err = client.write(&[7u8; 1025]).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { size: 1025, max: 1024 }));

        // The rejected write left nothing on the wire
        client.write(b"after").await.unwrap();
        assert_eq!(server.read_frame().await.unwrap().unwrap(), &b"after"[..]);
    }

    #[tokio::test]
    async fn test_shutdown_is_seen_as_end_of_stream() {
        let (mut client, mut server) = connected_pair(ChannelConfig::default()).await;

        client.write(b"last words").await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(server.read_frame().await.unwrap().unwrap(), &b"last words"[..]);
        assert!(server.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_split_halves_run_independently() {
        let (client, mut server) = connected_pair(ChannelConfig::default()).await;
        let (mut reader, mut writer) = client.into_split();

        let sender = tokio::spawn(async move {
            for i in 0..10u8 {
                writer.write(&[i; 8]).await.unwrap();
            }
            writer
        });

        for _ in 0..10 {
            let frame = server.read_frame().await.unwrap().unwrap();
            server.write(&frame).await.unwrap();
        }

        for i in 0..10u8 {
            assert_eq!(reader.read_frame().await.unwrap().unwrap(), &[i; 8][..]);
        }

        assert_eq!(sender.await.unwrap().frames_written(), 10);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_handshake() {
        let (client_io, _server_io) = duplex(64);
        let config = ChannelConfig::default().with_max_frame_size(0);

        let result = SecureStream::connect(client_io, &config).await;
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }
}
