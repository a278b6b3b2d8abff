//! Transport error types

use crypto_session::CryptoError;
use shared_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Entropy source failure: {0}")]
    EntropyFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Handshake failed: {0}")]
    HandshakeFailure(String),

    #[error("Incomplete frame: {0}")]
    IncompleteFrame(String),

    #[error("Frame authentication failed")]
    AuthenticationFailed,

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),
}

impl TransportError {
    /// Whether the process can no longer safely create keys or nonces
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EntropyFailure(_))
    }
}

impl From<CryptoError> for TransportError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::EntropyFailure(msg) => Self::EntropyFailure(msg),
            CryptoError::AuthenticationFailed => Self::AuthenticationFailed,
            CryptoError::InvalidPublicKey => {
                Self::HandshakeFailure("peer public key is not contributory".to_string())
            }
            other => Self::Crypto(other),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
