//! Error types for the wire protocol

use thiserror::Error;

/// Protocol error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame too short: {size} bytes (min: {min})")]
    FrameTooShort { size: usize, min: usize },

    #[error("Invalid frame length: {0}")]
    InvalidFrameLength(String),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
