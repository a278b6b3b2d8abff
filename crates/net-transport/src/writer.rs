//! Frame writer: seals plaintext and writes one frame per call

use std::io;

use crypto_session::{CryptoSession, NonceGenerator};
use shared_protocol::encode_frame;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::{ChannelConfig, TransportError, TransportResult};

/// Encrypting half of a secure channel
///
/// Owns the nonce generator for its direction. Each `write` draws a fresh
/// nonce and writes `length || nonce || ciphertext` with a single
/// `write_all`. If that fails part-way the writer is poisoned: the peer can
/// no longer find frame boundaries, so later writes are refused.
///
/// `write` is not cancel-safe. A write future dropped before it completes
/// may leave part of a frame on the wire, so it poisons the writer the same
/// way a failed write does.
pub struct SecureWriter<W> {
    inner: W,
    session: CryptoSession,
    nonces: NonceGenerator,
    max_frame_size: usize,
    frames_written: u64,
    poisoned: bool,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    pub fn new(inner: W, session: CryptoSession, config: &ChannelConfig) -> Self {
        Self {
            inner,
            session,
            nonces: NonceGenerator::new(),
            max_frame_size: config.max_frame_size,
            frames_written: 0,
            poisoned: false,
        }
    }

    /// Encrypt `plaintext` into one frame and write it
    ///
    /// Returns the number of plaintext bytes accepted, which is always the
    /// whole buffer. Plaintext over the frame limit is rejected before any
    /// nonce is drawn.
    pub async fn write(&mut self, plaintext: &[u8]) -> TransportResult<usize> {
        if self.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "secure writer unusable after a failed frame write",
            )
            .into());
        }

        if plaintext.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: plaintext.len(),
                max: self.max_frame_size,
            });
        }

        let nonce = self.nonces.next_nonce()?;
        let ciphertext = self.session.seal(&nonce, plaintext)?;
        let frame = encode_frame(nonce.as_bytes(), &ciphertext)?;

        // Cleared only once the whole frame is flushed
        self.poisoned = true;
        self.write_frame(&frame).await?;
        self.poisoned = false;

        self.frames_written += 1;
        trace!(len = plaintext.len(), frames = self.frames_written, "Frame written");

        Ok(plaintext.len())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.inner.write_all(frame).await?;
        self.inner.flush().await
    }

    /// Close the write direction of the underlying stream
    pub async fn shutdown(&mut self) -> TransportResult<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn session(&self) -> &CryptoSession {
        &self.session
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
