//! Cryptographic session management with X25519 + XChaCha20Poly1305

use std::fmt;

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use tracing::debug;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroizing;

use crate::{CryptoError, CryptoResult, KEY_SIZE, Nonce, PUBLIC_KEY_SIZE, TAG_SIZE};

/// HKDF salt for domain separation
const HKDF_SALT: &[u8] = b"secure-echo-hkdf-salt-v1";

/// HKDF info string for session key derivation
const HKDF_INFO: &[u8] = b"secure-echo-frame-key-v1";

/// Key pair for ephemeral key exchange
///
/// The private half is zeroized when the key pair is dropped.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new ephemeral key pair from the operating system RNG
    pub fn generate() -> CryptoResult<Self> {
        Self::generate_from_rng(&mut OsRng)
    }

    /// Generate a key pair from the given RNG
    pub fn generate_from_rng<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> CryptoResult<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        rng.try_fill_bytes(&mut bytes[..])
            .map_err(|e| CryptoError::EntropyFailure(e.to_string()))?;

        let secret = StaticSecret::from(*bytes);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Perform Diffie-Hellman key exchange
    pub fn diffie_hellman(&self, their_public: &PeerPublicKey) -> SharedSecret {
        let their_public = PublicKey::from(*their_public.as_bytes());
        self.secret.diffie_hellman(&their_public)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &PeerPublicKey::from_bytes(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// Public key received from the other side of the handshake
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerPublicKey([u8; PUBLIC_KEY_SIZE]);

impl PeerPublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Short hex prefix, for logs
    pub fn fingerprint(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl From<[u8; PUBLIC_KEY_SIZE]> for PeerPublicKey {
    fn from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PeerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerPublicKey({}..)", self.fingerprint())
    }
}

/// Role in the handshake (decides who sends its public key first)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We initiated the connection
    Initiator,
    /// We received the connection
    Responder,
}

/// Established cryptographic session
///
/// Holds the symmetric key derived from (our private key, peer public key).
/// Sealing binds our public key as associated data and opening expects the
/// peer's, so a frame replayed back at its sender never authenticates.
#[derive(Clone)]
pub struct CryptoSession {
    cipher: XChaCha20Poly1305,
    direction: Direction,
    local_public: PeerPublicKey,
    peer_public: PeerPublicKey,
}

impl CryptoSession {
    /// Create a new session from a shared secret
    ///
    /// # Arguments
    /// * `shared_secret` - The result of X25519 key exchange
    /// * `direction` - Whether we initiated or responded
    /// * `local_public` - Our public key
    /// * `peer_public` - The peer's public key
    pub fn from_shared_secret(
        shared_secret: &SharedSecret,
        direction: Direction,
        local_public: PeerPublicKey,
        peer_public: PeerPublicKey,
    ) -> CryptoResult<Self> {
        if !shared_secret.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }

        let key = derive_session_key(shared_secret.as_bytes())?;
        let cipher = XChaCha20Poly1305::new_from_slice(&key[..])
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        debug!(?direction, peer = %peer_public.fingerprint(), "Session key derived");

        Ok(Self {
            cipher,
            direction,
            local_public,
            peer_public,
        })
    }

    /// Encrypt a frame payload under the given nonce
    ///
    /// Returns: [ciphertext][16-byte auth tag]
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let payload = Payload {
            msg: plaintext,
            aad: self.local_public.as_bytes(),
        };

        self.cipher
            .encrypt(XNonce::from_slice(nonce.as_bytes()), payload)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Authenticate and decrypt a frame payload sent by the peer
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }

        let payload = Payload {
            msg: ciphertext,
            aad: self.peer_public.as_bytes(),
        };

        self.cipher
            .decrypt(XNonce::from_slice(nonce.as_bytes()), payload)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn local_public_key(&self) -> &PeerPublicKey {
        &self.local_public
    }

    pub fn peer_public_key(&self) -> &PeerPublicKey {
        &self.peer_public
    }
}

impl fmt::Debug for CryptoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoSession")
            .field("direction", &self.direction)
            .field("local_public", &self.local_public)
            .field("peer_public", &self.peer_public)
            .finish_non_exhaustive()
    }
}

/// Derive the frame key from the raw X25519 output via HKDF-SHA256
fn derive_session_key(shared_secret: &[u8; 32]) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared_secret);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(HKDF_INFO, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Builder for establishing a crypto session through handshake
pub struct HandshakeBuilder {
    our_keypair: KeyPair,
    direction: Direction,
}

impl HandshakeBuilder {
    /// Start a new handshake as initiator
    pub fn new_initiator() -> CryptoResult<Self> {
        Ok(Self::with_keypair(KeyPair::generate()?, Direction::Initiator))
    }

    /// Start a new handshake as responder
    pub fn new_responder() -> CryptoResult<Self> {
        Ok(Self::with_keypair(KeyPair::generate()?, Direction::Responder))
    }

    pub fn with_keypair(our_keypair: KeyPair, direction: Direction) -> Self {
        Self {
            our_keypair,
            direction,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Get our public key to send to the peer
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.our_keypair.public_key_bytes()
    }

    /// Complete the handshake with the peer's public key
    ///
    /// Consumes the key pair; the private key is dropped once the session
    /// key has been derived.
    pub fn complete(self, their_public: &PeerPublicKey) -> CryptoResult<CryptoSession> {
        let shared_secret = self.our_keypair.diffie_hellman(their_public);
        let local_public = PeerPublicKey::from_bytes(self.our_keypair.public_key_bytes());
        CryptoSession::from_shared_secret(
            &shared_secret,
            self.direction,
            local_public,
            *their_public,
        )
    }
}
