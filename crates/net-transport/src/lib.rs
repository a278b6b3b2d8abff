//! Network Transport - secure channel over byte streams
//!
//! Runs the public key handshake over any `AsyncRead + AsyncWrite` stream
//! and wraps it in length-prefixed, authenticated-encryption frames. The
//! client side is [`dial`]; the server side is [`EchoServer`].

mod config;
mod error;
mod handshake;
mod reader;
mod server;
mod stream;
mod writer;

pub use config::*;
pub use error::*;
pub use handshake::*;
pub use reader::*;
pub use server::*;
pub use stream::*;
pub use writer::*;

pub use crypto_session::{Direction, PeerPublicKey};
pub use shared_protocol::{DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE_LIMIT};
