//! Crypto Session - authenticated encryption for the secure echo channel
//!
//! Provides ephemeral X25519 key agreement with XChaCha20Poly1305 frame
//! encryption. Every frame carries its own random 24-byte nonce.

mod error;
mod nonce;
mod session;

pub use error::*;
pub use nonce::*;
pub use session::*;

pub use shared_protocol::{NONCE_SIZE, PUBLIC_KEY_SIZE, TAG_SIZE};

/// Symmetric session key size (256 bits / 32 bytes)
pub const KEY_SIZE: usize = 32;
