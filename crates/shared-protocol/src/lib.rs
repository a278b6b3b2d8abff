//! Shared Protocol Definitions for the secure echo channel
//!
//! Wire constants and the frame codec shared by both peers. A connection
//! carries a fixed 32-byte public key from each side, followed by frames:
//!
//! ```text
//! +----------------+-----------------+------------------------------+
//! | length (u32 BE)| nonce (24 bytes)| ciphertext (length bytes)    |
//! +----------------+-----------------+------------------------------+
//! ```
//!
//! `length` counts ciphertext bytes only, i.e. plaintext length plus the
//! 16-byte authentication tag.

mod error;
mod frame;

pub use error::*;
pub use frame::*;

/// Public key size exchanged during the handshake (256 bits / 32 bytes)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Nonce size for XChaCha20Poly1305 (192 bits / 24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Size of the big-endian length prefix in front of every frame
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Bytes a frame adds on top of its plaintext
pub const FRAME_OVERHEAD: usize = LENGTH_PREFIX_SIZE + NONCE_SIZE + TAG_SIZE;

/// Default maximum plaintext bytes carried by one frame
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024;

/// Hard upper bound for a configured maximum frame size
pub const MAX_FRAME_SIZE_LIMIT: usize = 16 * 1024 * 1024;
