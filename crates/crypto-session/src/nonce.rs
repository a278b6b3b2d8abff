//! Per-frame nonces

use std::fmt;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::{CryptoError, CryptoResult, NONCE_SIZE};

/// 24-byte XChaCha20Poly1305 nonce, sent in the clear in front of each frame
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; NONCE_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Source of fresh nonces for a single writer
///
/// Each nonce is drawn from a cryptographically secure RNG. With 192-bit
/// nonces the birthday bound (~2^96 frames) is far beyond any session.
/// `next_nonce` takes `&mut self`, so a generator cannot be shared between
/// writers or connections.
pub struct NonceGenerator<R = OsRng> {
    rng: R,
    last: Option<Nonce>,
    issued: u64,
}

impl NonceGenerator<OsRng> {
    /// Create a generator backed by the operating system RNG
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }
}

impl Default for NonceGenerator<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore + CryptoRng> NonceGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            last: None,
            issued: 0,
        }
    }

    /// Draw the nonce for the next frame
    ///
    /// Fails with `EntropyFailure` if the RNG errors or hands back the
    /// previous value, which only a broken entropy source can do.
    pub fn next_nonce(&mut self) -> CryptoResult<Nonce> {
        let mut bytes = [0u8; NONCE_SIZE];
        self.rng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::EntropyFailure(e.to_string()))?;

        let nonce = Nonce(bytes);
        if self.last == Some(nonce) {
            return Err(CryptoError::EntropyFailure(
                "entropy source repeated a nonce".to_string(),
            ));
        }

        self.last = Some(nonce);
        self.issued += 1;

        Ok(nonce)
    }

    /// Number of nonces handed out so far
    pub fn issued(&self) -> u64 {
        self.issued
    }
}
