//! Frame reader: reassembles frames from the byte stream and opens them

use bytes::{Buf, Bytes, BytesMut};
use crypto_session::{CryptoSession, Nonce};
use shared_protocol::{
    LENGTH_PREFIX_SIZE, NONCE_SIZE, decode_frame_len, max_ciphertext_len, split_frame_body,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::{ChannelConfig, TransportError, TransportResult};

/// Initial capacity of the receive buffer
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Decrypting half of a secure channel
///
/// Frames are delimited by their length prefix, never by the boundaries of
/// the underlying reads. A frame that fails authentication is consumed and
/// dropped whole, so the stream stays aligned on the next frame.
///
/// Bytes of a frame that has not fully arrived are kept in the reader, so
/// `read_frame` and `read` are cancel-safe: dropping the future (for example
/// on a `select!` branch or a timeout) loses no data.
pub struct SecureReader<R> {
    inner: R,
    session: CryptoSession,
    max_frame_size: usize,
    buffer: BytesMut,
    pending: Bytes,
    frames_read: u64,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    pub fn new(inner: R, session: CryptoSession, config: &ChannelConfig) -> Self {
        Self {
            inner,
            session,
            max_frame_size: config.max_frame_size,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            pending: Bytes::new(),
            frames_read: 0,
        }
    }

    /// Read, authenticate and decrypt the next frame
    ///
    /// Returns `Ok(None)` when the peer closed the stream between frames.
    pub async fn read_frame(&mut self) -> TransportResult<Option<Bytes>> {
        loop {
            if let Some(frame) = self.decode_buffered()? {
                return Ok(Some(frame));
            }

            if self.inner.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::IncompleteFrame(format!(
                    "stream closed after {} bytes of a frame",
                    self.buffer.len()
                )));
            }
        }
    }

    /// Open the first frame in the buffer once all of it has arrived
    fn decode_buffered(&mut self) -> TransportResult<Option<Bytes>> {
        if self.buffer.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&self.buffer[..LENGTH_PREFIX_SIZE]);
        let len = decode_frame_len(prefix, max_ciphertext_len(self.max_frame_size))
            .map_err(|e| TransportError::IncompleteFrame(e.to_string()))?;

        let total = LENGTH_PREFIX_SIZE + NONCE_SIZE + len;
        if self.buffer.len() < total {
            self.buffer.reserve(total - self.buffer.len());
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(total).freeze();
        frame.advance(LENGTH_PREFIX_SIZE);
        let (nonce, ciphertext) =
            split_frame_body(&frame).map_err(|e| TransportError::IncompleteFrame(e.to_string()))?;
        let plaintext = self.session.open(&Nonce::from_bytes(nonce), ciphertext)?;

        self.frames_read += 1;
        trace!(len = plaintext.len(), frames = self.frames_read, "Frame read");

        Ok(Some(Bytes::from(plaintext)))
    }

    /// Read decrypted bytes into `buf`
    ///
    /// Plaintext that does not fit is kept and returned by the following
    /// calls before another frame is read. Returns `Ok(0)` at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self.read_frame().await? {
                Some(frame) => self.pending = frame,
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);

        Ok(n)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn session(&self) -> &CryptoSession {
        &self.session
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
